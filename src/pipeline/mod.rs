//! The `pipeline` module turns a client submission into a durable record.
//!
//! `message` holds the submission and record types; `ingest` drives a record
//! through the store, the cache and the durable log, reporting each step's
//! result independently.

pub mod ingest;
pub mod message;

pub use ingest::{IngestOutcome, IngestPipeline, IngestStep};
pub use message::{MessageRecord, MessageSubmission};
