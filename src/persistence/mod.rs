//! The `persistence` module holds the two storage backends the ingestion
//! pipeline writes to.
//!
//! - `sled_store`: the system of record. Rows are keyed by message id and
//!   written with insert-if-absent, so replays are harmless.
//! - `cache`: a recency window with per-key expiry, used to serve reads of
//!   recent messages without touching the store.

pub mod cache;
pub mod sled_store;

pub use cache::{MemoryCache, MessageCache};
pub use sled_store::{MessageStore, SledStore, UpsertOutcome, open_db};
