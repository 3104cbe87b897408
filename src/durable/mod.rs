//! The `durable` module is the append-only log every accepted message is
//! written to, plus the consumer loop that turns log entries into local
//! side effects.
//!
//! - `log`: producer/consumer traits and the sled-backed single-partition log
//! - `consumer`: fetch → apply → commit loop with at-least-once redelivery

pub mod consumer;
pub mod log;

pub use consumer::{ConsumerLoop, LogHandler, Reconciler, StepOutcome, Validator};
pub use log::{LogConsumer, LogEntry, LogProducer, SledLog, SledLogConsumer};

#[cfg(test)]
mod tests;
