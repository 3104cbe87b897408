//! Persistence layer backed by `sled`
//!
//! Messages live in a single `messages` tree keyed by the 16 raw bytes of
//! their UUID. `upsert` uses compare-and-swap against an absent key, which
//! gives the idempotent insert the pipeline and the consumer both rely on:
//! the first write for an id wins and every later one is a no-op.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sled::Db;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::message::MessageRecord;
use crate::utils::{ChatError, Result};

const MESSAGES_TREE: &str = "messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A row with the same id already existed; nothing was written.
    Duplicate,
}

/// Store contract: idempotent upsert by `message_id`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn upsert(&self, record: &MessageRecord) -> Result<UpsertOutcome>;

    async fn get(&self, id: &Uuid) -> Result<Option<MessageRecord>>;

    async fn len(&self) -> Result<usize>;
}

/// Open or create the sled database at `path`, retrying while the store is
/// not yet available (for example while a previous process still holds the
/// file lock).
pub async fn open_db(path: &Path, attempts: u32, delay: Duration) -> Result<Db> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match sled::open(path) {
            Ok(db) => {
                info!(path = %path.display(), attempt, "store opened");
                return Ok(db);
            }
            Err(e) => {
                warn!(path = %path.display(), attempt, error = %e, "store not ready");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ChatError::Bootstrap {
        attempts,
        reason: last_error,
    })
}

#[derive(Clone)]
pub struct SledStore {
    messages: sled::Tree,
}

impl SledStore {
    /// Opens (creating if absent) the `messages` tree.
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            messages: db.open_tree(MESSAGES_TREE)?,
        })
    }
}

#[async_trait]
impl MessageStore for SledStore {
    async fn upsert(&self, record: &MessageRecord) -> Result<UpsertOutcome> {
        let value = record.to_bytes()?;
        let swapped = self.messages.compare_and_swap(
            record.message_id.as_bytes(),
            None as Option<&[u8]>,
            Some(value),
        )?;

        match swapped {
            Ok(()) => {
                self.messages.flush_async().await?;
                debug!(message_id = %record.message_id, "message saved");
                Ok(UpsertOutcome::Inserted)
            }
            Err(_) => {
                debug!(message_id = %record.message_id, "message already stored");
                Ok(UpsertOutcome::Duplicate)
            }
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Option<MessageRecord>> {
        match self.messages.get(id.as_bytes())? {
            Some(raw) => Ok(Some(MessageRecord::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.messages.len())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("tree", &MESSAGES_TREE)
            .finish()
    }
}
