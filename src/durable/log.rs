//! Single-partition durable log backed by `sled`.
//!
//! Layout:
//! - `log:<topic>` tree: key = offset as big-endian `u64`, value =
//!   `[u16 key length][partition key][payload]`
//! - `log_offsets` tree: key = `<topic>/<group>`, value = last committed
//!   offset as big-endian `u64`
//!
//! Offsets are contiguous and start at 0. Appends within one process are
//! serialized so an offset is never inserted behind one a consumer has
//! already read. Consumers always fetch the first entry after their commit
//! position; an entry that is fetched but not committed is fetched again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sled::Db;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::utils::{ChatError, Result};

const OFFSETS_TREE: &str = "log_offsets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub offset: u64,
    pub key: String,
    pub value: Vec<u8>,
}

#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Appends `value` under `partition_key`, returning its offset.
    async fn append(&self, partition_key: &str, value: &[u8]) -> Result<u64>;
}

#[async_trait]
pub trait LogConsumer: Send {
    /// Waits for the first entry after the commit position.
    async fn fetch_next(&mut self) -> Result<LogEntry>;

    /// Moves the commit position to `offset`. Positions never move back.
    async fn commit(&mut self, offset: u64) -> Result<()>;

    fn committed(&self) -> Option<u64>;
}

#[derive(Clone)]
pub struct SledLog {
    topic: String,
    entries: sled::Tree,
    offsets: sled::Tree,
    append_lock: Arc<Mutex<()>>,
    appended: Arc<Notify>,
}

impl SledLog {
    pub fn open(db: &Db, topic: &str) -> Result<Self> {
        Ok(Self {
            topic: topic.to_string(),
            entries: db.open_tree(format!("log:{topic}"))?,
            offsets: db.open_tree(OFFSETS_TREE)?,
            append_lock: Arc::new(Mutex::new(())),
            appended: Arc::new(Notify::new()),
        })
    }

    /// Number of entries ever appended.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Creates a consumer for `group`, resuming after its stored commit
    /// position. `poll_interval` bounds how long a fetch waits before
    /// re-reading the tree (appends from other processes do not notify).
    pub fn consumer(&self, group: &str, poll_interval: Duration) -> Result<SledLogConsumer> {
        let checkpoint_key = format!("{}/{group}", self.topic);
        let committed = match self.offsets.get(checkpoint_key.as_bytes())? {
            Some(raw) => Some(decode_offset(&raw)?),
            None => None,
        };
        info!(topic = %self.topic, group, ?committed, "log consumer created");

        Ok(SledLogConsumer {
            log: self.clone(),
            checkpoint_key,
            committed,
            poll_interval,
        })
    }

    fn append_blocking(&self, partition_key: &str, value: &[u8]) -> Result<u64> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| ChatError::LogTransport("append lock poisoned".into()))?;

        let offset = match self.entries.last()? {
            Some((key, _)) => decode_offset(&key)? + 1,
            None => 0,
        };
        self.entries
            .insert(offset.to_be_bytes(), encode_entry(partition_key, value)?)?;
        Ok(offset)
    }
}

#[async_trait]
impl LogProducer for SledLog {
    async fn append(&self, partition_key: &str, value: &[u8]) -> Result<u64> {
        let offset = self.append_blocking(partition_key, value)?;
        self.entries.flush_async().await?;
        self.appended.notify_waiters();
        debug!(topic = %self.topic, offset, "entry appended");
        Ok(offset)
    }
}

impl std::fmt::Debug for SledLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledLog")
            .field("topic", &self.topic)
            .finish()
    }
}

#[derive(Debug)]
pub struct SledLogConsumer {
    log: SledLog,
    checkpoint_key: String,
    committed: Option<u64>,
    poll_interval: Duration,
}

impl SledLogConsumer {
    fn next_offset(&self) -> u64 {
        self.committed.map_or(0, |c| c + 1)
    }

    fn peek(&self) -> Result<Option<LogEntry>> {
        let start = self.next_offset().to_be_bytes();
        match self.log.entries.range(start..).next() {
            Some(Ok((key, raw))) => Ok(Some(decode_entry(decode_offset(&key)?, &raw)?)),
            Some(Err(e)) => Err(ChatError::LogTransport(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LogConsumer for SledLogConsumer {
    async fn fetch_next(&mut self) -> Result<LogEntry> {
        loop {
            let appended = self.log.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(entry) = self.peek()? {
                return Ok(entry);
            }

            let _ = tokio::time::timeout(self.poll_interval, appended).await;
        }
    }

    async fn commit(&mut self, offset: u64) -> Result<()> {
        if let Some(committed) = self.committed {
            if offset <= committed {
                return Err(ChatError::CommitRegression { offset, committed });
            }
        }

        self.log
            .offsets
            .insert(self.checkpoint_key.as_bytes(), offset.to_be_bytes().to_vec())?;
        self.log.offsets.flush_async().await?;
        self.committed = Some(offset);
        Ok(())
    }

    fn committed(&self) -> Option<u64> {
        self.committed
    }
}

fn decode_offset(raw: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| ChatError::LogTransport(format!("corrupt offset of {} bytes", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn encode_entry(partition_key: &str, value: &[u8]) -> Result<Vec<u8>> {
    let key_len = u16::try_from(partition_key.len())
        .map_err(|_| ChatError::Validation("partition key longer than 65535 bytes".into()))?;
    let mut buf = Vec::with_capacity(2 + partition_key.len() + value.len());
    buf.extend_from_slice(&key_len.to_be_bytes());
    buf.extend_from_slice(partition_key.as_bytes());
    buf.extend_from_slice(value);
    Ok(buf)
}

fn decode_entry(offset: u64, raw: &[u8]) -> Result<LogEntry> {
    let corrupt = || ChatError::LogTransport(format!("corrupt log entry at offset {offset}"));
    if raw.len() < 2 {
        return Err(corrupt());
    }
    let key_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    let key = raw.get(2..2 + key_len).ok_or_else(corrupt)?;
    let key = String::from_utf8(key.to_vec()).map_err(|_| corrupt())?;

    Ok(LogEntry {
        offset,
        key,
        value: raw[2 + key_len..].to_vec(),
    })
}
