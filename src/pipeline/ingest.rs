//! Ingestion pipeline
//!
//! `ingest` assigns identity and then runs three independent writes:
//! 1. idempotent upsert into the store
//! 2. cache set under `<prefix><message_id>` with the cache window as TTL
//! 3. append to the durable log under the constant partition key
//!
//! Every step is attempted even if an earlier one failed, and nothing is
//! rolled back. The log append is the durability point: the consumer loop
//! replays the log into the store and cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::durable::LogProducer;
use crate::persistence::{MessageCache, MessageStore, UpsertOutcome};
use crate::pipeline::message::{MessageRecord, MessageSubmission};
use crate::utils::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    Persist,
    Cache,
    Append,
}

impl IngestStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStep::Persist => "persist",
            IngestStep::Cache => "cache",
            IngestStep::Append => "append",
        }
    }
}

impl fmt::Display for IngestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub record: MessageRecord,
    pub persisted: Result<UpsertOutcome>,
    pub cached: Result<()>,
    /// Offset of the log entry on success.
    pub appended: Result<u64>,
}

impl IngestOutcome {
    pub fn is_persisted(&self) -> bool {
        self.persisted.is_ok()
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_ok()
    }

    /// True once the log holds the record.
    pub fn is_durable(&self) -> bool {
        self.appended.is_ok()
    }

    pub fn errors(&self) -> Vec<(IngestStep, &ChatError)> {
        let mut errors = Vec::new();
        if let Err(e) = &self.persisted {
            errors.push((IngestStep::Persist, e));
        }
        if let Err(e) = &self.cached {
            errors.push((IngestStep::Cache, e));
        }
        if let Err(e) = &self.appended {
            errors.push((IngestStep::Append, e));
        }
        errors
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn MessageCache>,
    log: Arc<dyn LogProducer>,
    cache_ttl: Duration,
    key_prefix: String,
    partition_key: String,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        cache: Arc<dyn MessageCache>,
        log: Arc<dyn LogProducer>,
        cache_ttl: Duration,
        key_prefix: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            log,
            cache_ttl,
            key_prefix: key_prefix.into(),
            partition_key: partition_key.into(),
        }
    }

    pub async fn ingest(&self, submission: MessageSubmission) -> IngestOutcome {
        self.ingest_record(MessageRecord::assign(submission)).await
    }

    /// Runs the three writes for a record that already has its identity.
    pub async fn ingest_record(&self, record: MessageRecord) -> IngestOutcome {
        let persisted = self.store.upsert(&record).await;
        if let Err(e) = &persisted {
            warn!(message_id = %record.message_id, error = %e, "failed to save message");
        }

        let serialized = record.to_bytes();

        let cached = match &serialized {
            Ok(bytes) => {
                self.cache
                    .set(&record.cache_key(&self.key_prefix), bytes.clone(), self.cache_ttl)
                    .await
            }
            Err(e) => Err(ChatError::Cache(e.to_string())),
        };
        if let Err(e) = &cached {
            warn!(message_id = %record.message_id, error = %e, "failed to cache message");
        }

        let appended = match &serialized {
            Ok(bytes) => self.log.append(&self.partition_key, bytes).await,
            Err(e) => Err(ChatError::Validation(e.to_string())),
        };
        if let Err(e) = &appended {
            warn!(message_id = %record.message_id, error = %e, "failed to append message to log");
        }

        debug!(
            message_id = %record.message_id,
            persisted = persisted.is_ok(),
            cached = cached.is_ok(),
            appended = appended.is_ok(),
            "message ingested"
        );

        IngestOutcome {
            record,
            persisted,
            cached,
            appended,
        }
    }

    /// Records currently in the cache window, oldest first.
    pub async fn recent(&self) -> Result<Vec<MessageRecord>> {
        let keys = self.cache.list_keys(&self.key_prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // an entry can expire between listing and reading it
            let Some(raw) = self.cache.get(&key).await? else {
                continue;
            };
            match MessageRecord::from_slice(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable cache entry"),
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

impl fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("cache_ttl", &self.cache_ttl)
            .field("key_prefix", &self.key_prefix)
            .field("partition_key", &self.partition_key)
            .finish()
    }
}
