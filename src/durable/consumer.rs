//! Durable consumer loop
//!
//! Each iteration fetches the first entry after the commit position,
//! applies the configured side effect and commits that entry's offset only
//! if the side effect succeeded. A failed side effect leaves the position
//! where it was, so the same entry comes back on the next iteration.
//!
//! Failure handling:
//! - side effect error: logged, retried after `retry_backoff`
//! - commit error: logged, the entry is redelivered
//! - fetch error: returned from `run`, which ends the process

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::durable::log::{LogConsumer, LogEntry};
use crate::persistence::{MessageCache, MessageStore};
use crate::pipeline::message::MessageRecord;
use crate::utils::Result;

/// Side effect applied to every log entry. Implementations must be
/// idempotent: an entry can be applied more than once.
#[async_trait]
pub trait LogHandler: Send + Sync {
    async fn apply(&self, entry: &LogEntry) -> Result<()>;
}

/// Decodes and validates the entry without touching any backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validator;

#[async_trait]
impl LogHandler for Validator {
    async fn apply(&self, entry: &LogEntry) -> Result<()> {
        let record = MessageRecord::from_slice(&entry.value)?;
        record.validate()
    }
}

/// Re-persists and re-caches every entry, repairing any store or cache
/// write the ingestion path lost.
pub struct Reconciler {
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn MessageCache>,
    cache_ttl: Duration,
    key_prefix: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MessageStore>,
        cache: Arc<dyn MessageCache>,
        cache_ttl: Duration,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
            key_prefix: key_prefix.into(),
        }
    }

    /// What is left of the record's cache window, if anything.
    fn remaining_ttl(&self, record: &MessageRecord) -> Option<Duration> {
        let window = chrono::Duration::from_std(self.cache_ttl).ok()?;
        let expires_at = record.created_at + window;
        (expires_at - Utc::now()).to_std().ok()
    }
}

#[async_trait]
impl LogHandler for Reconciler {
    async fn apply(&self, entry: &LogEntry) -> Result<()> {
        let record = MessageRecord::from_slice(&entry.value)?;
        record.validate()?;

        let outcome = self.store.upsert(&record).await?;
        debug!(message_id = %record.message_id, ?outcome, "reconciled store row");

        if let Some(ttl) = self.remaining_ttl(&record) {
            if !ttl.is_zero() {
                self.cache
                    .set(&record.cache_key(&self.key_prefix), entry.value.clone(), ttl)
                    .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Committed(u64),
    /// The side effect or the commit failed; the position did not move.
    Failed(u64),
}

pub struct ConsumerLoop<C: LogConsumer> {
    consumer: C,
    handler: Arc<dyn LogHandler>,
    retry_backoff: Duration,
}

impl<C: LogConsumer> ConsumerLoop<C> {
    pub fn new(consumer: C, handler: Arc<dyn LogHandler>, retry_backoff: Duration) -> Self {
        Self {
            consumer,
            handler,
            retry_backoff,
        }
    }

    pub fn committed(&self) -> Option<u64> {
        self.consumer.committed()
    }

    /// One fetch → apply → commit iteration. Only fetch errors are returned.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        let entry = self.consumer.fetch_next().await?;
        let offset = entry.offset;

        if let Err(e) = self.handler.apply(&entry).await {
            warn!(offset, error = %e, "failed to process log entry");
            return Ok(StepOutcome::Failed(offset));
        }

        match self.consumer.commit(offset).await {
            Ok(()) => {
                debug!(offset, "processed and committed log entry");
                Ok(StepOutcome::Committed(offset))
            }
            Err(e) => {
                warn!(offset, error = %e, "failed to commit offset");
                Ok(StepOutcome::Failed(offset))
            }
        }
    }

    /// Runs until fetching from the log fails.
    pub async fn run(mut self) -> Result<()> {
        info!(committed = ?self.consumer.committed(), "listening for log entries");
        loop {
            match self.step().await {
                Ok(StepOutcome::Committed(_)) => {}
                Ok(StepOutcome::Failed(_)) => tokio::time::sleep(self.retry_backoff).await,
                Err(e) => {
                    error!(error = %e, "error while fetching from log");
                    return Err(e);
                }
            }
        }
    }
}
