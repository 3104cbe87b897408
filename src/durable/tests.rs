use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use super::*;
use crate::persistence::{MemoryCache, MessageCache, MessageStore, SledStore};
use crate::pipeline::message::{MessageRecord, MessageSubmission};
use crate::utils::{ChatError, Result};

const POLL: Duration = Duration::from_millis(20);

fn open_log() -> (SledLog, sled::Db, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let log = SledLog::open(&db, "chat-topic").unwrap();
    (log, db, dir)
}

fn record_bytes(content: &str) -> (MessageRecord, Vec<u8>) {
    let record = MessageRecord::assign(MessageSubmission {
        sender_id: 1,
        receiver_id: 2,
        content: content.to_string(),
    });
    let bytes = record.to_bytes().unwrap();
    (record, bytes)
}

/// Fails the first `failures` applications, then succeeds.
struct FlakyHandler {
    failures: AtomicUsize,
    applied: AtomicUsize,
}

impl FlakyHandler {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            applied: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LogHandler for FlakyHandler {
    async fn apply(&self, _entry: &LogEntry) -> Result<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChatError::Cache("store unavailable".into()));
        }
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_append_assigns_contiguous_offsets() {
    let (log, _db, _dir) = open_log();
    assert_eq!(log.append("chat-key", b"a").await.unwrap(), 0);
    assert_eq!(log.append("chat-key", b"b").await.unwrap(), 1);
    assert_eq!(log.append("chat-key", b"c").await.unwrap(), 2);
    assert_eq!(log.len(), 3);
}

#[tokio::test]
async fn test_fetch_returns_entry_with_key_and_payload() {
    let (log, _db, _dir) = open_log();
    log.append("chat-key", b"payload").await.unwrap();

    let mut consumer = log.consumer("group", POLL).unwrap();
    let entry = consumer.fetch_next().await.unwrap();
    assert_eq!(
        entry,
        LogEntry {
            offset: 0,
            key: "chat-key".into(),
            value: b"payload".to_vec(),
        }
    );
}

#[tokio::test]
async fn test_fetch_blocks_until_append() {
    let (log, _db, _dir) = open_log();
    let mut consumer = log.consumer("group", Duration::from_secs(30)).unwrap();

    let fetch = tokio::spawn(async move { consumer.fetch_next().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fetch.is_finished());

    log.append("chat-key", b"late").await.unwrap();
    let entry = tokio::time::timeout(Duration::from_secs(2), fetch)
        .await
        .expect("fetch should wake on append")
        .unwrap()
        .unwrap();
    assert_eq!(entry.value, b"late");
}

#[tokio::test]
async fn test_uncommitted_entry_is_fetched_again() {
    let (log, _db, _dir) = open_log();
    log.append("chat-key", b"first").await.unwrap();
    log.append("chat-key", b"second").await.unwrap();

    let mut consumer = log.consumer("group", POLL).unwrap();
    assert_eq!(consumer.fetch_next().await.unwrap().offset, 0);
    assert_eq!(consumer.fetch_next().await.unwrap().offset, 0);

    consumer.commit(0).await.unwrap();
    assert_eq!(consumer.fetch_next().await.unwrap().offset, 1);
}

#[tokio::test]
async fn test_commit_rejects_regression() {
    let (log, _db, _dir) = open_log();
    log.append("chat-key", b"x").await.unwrap();
    log.append("chat-key", b"y").await.unwrap();

    let mut consumer = log.consumer("group", POLL).unwrap();
    consumer.commit(1).await.unwrap();
    let err = consumer.commit(1).await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::CommitRegression {
            offset: 1,
            committed: 1
        }
    ));
    assert_eq!(consumer.committed(), Some(1));
}

#[tokio::test]
async fn test_commit_position_survives_new_consumer() {
    let (log, _db, _dir) = open_log();
    for payload in [b"a", b"b", b"c"] {
        log.append("chat-key", payload).await.unwrap();
    }

    let mut consumer = log.consumer("group", POLL).unwrap();
    consumer.commit(1).await.unwrap();
    drop(consumer);

    let mut resumed = log.consumer("group", POLL).unwrap();
    assert_eq!(resumed.committed(), Some(1));
    assert_eq!(resumed.fetch_next().await.unwrap().offset, 2);

    // other groups keep their own position
    let mut other = log.consumer("other", POLL).unwrap();
    assert_eq!(other.fetch_next().await.unwrap().offset, 0);
}

#[tokio::test]
async fn test_failed_side_effect_redelivers_same_entry() {
    let (log, _db, _dir) = open_log();
    let (_, bytes) = record_bytes("hi");
    log.append("chat-key", &bytes).await.unwrap();

    let handler = Arc::new(FlakyHandler::new(2));
    let consumer = log.consumer("group", POLL).unwrap();
    let mut worker = ConsumerLoop::new(consumer, handler.clone(), Duration::ZERO);

    assert_eq!(worker.step().await.unwrap(), StepOutcome::Failed(0));
    assert_eq!(worker.committed(), None);
    assert_eq!(worker.step().await.unwrap(), StepOutcome::Failed(0));
    assert_eq!(worker.committed(), None);
    assert_eq!(worker.step().await.unwrap(), StepOutcome::Committed(0));
    assert_eq!(worker.committed(), Some(0));
    assert_eq!(handler.applied.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_commits_in_log_order() {
    let (log, _db, _dir) = open_log();
    for content in ["one", "two", "three"] {
        let (_, bytes) = record_bytes(content);
        log.append("chat-key", &bytes).await.unwrap();
    }

    let consumer = log.consumer("group", POLL).unwrap();
    let worker = ConsumerLoop::new(consumer, Arc::new(Validator), Duration::ZERO);
    let handle = tokio::spawn(worker.run());

    let mut committed = None;
    for _ in 0..100 {
        committed = log.consumer("group", POLL).unwrap().committed();
        if committed == Some(2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(committed, Some(2));
    handle.abort();
}

#[tokio::test]
async fn test_validator_rejects_malformed_entry() {
    let entry = LogEntry {
        offset: 0,
        key: "chat-key".into(),
        value: b"not json".to_vec(),
    };
    assert!(Validator.apply(&entry).await.is_err());

    let (mut record, _) = record_bytes("x");
    record.message_id = uuid::Uuid::nil();
    let entry = LogEntry {
        offset: 1,
        key: "chat-key".into(),
        value: record.to_bytes().unwrap(),
    };
    assert!(matches!(
        Validator.apply(&entry).await,
        Err(ChatError::Validation(_))
    ));
}

#[tokio::test]
async fn test_validator_accepts_empty_content() {
    let (mut record, _) = record_bytes("x");
    record.content.clear();
    let entry = LogEntry {
        offset: 0,
        key: "chat-key".into(),
        value: record.to_bytes().unwrap(),
    };
    assert!(Validator.apply(&entry).await.is_ok());
}

#[tokio::test]
async fn test_reconciler_repairs_store_and_cache() {
    let dir = tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = Arc::new(SledStore::new(&db).unwrap());
    let cache = Arc::new(MemoryCache::new());
    let reconciler = Reconciler::new(
        store.clone(),
        cache.clone(),
        Duration::from_secs(600),
        "message:",
    );

    let (record, bytes) = record_bytes("lost on ingest");
    let entry = LogEntry {
        offset: 0,
        key: "chat-key".into(),
        value: bytes.clone(),
    };

    reconciler.apply(&entry).await.unwrap();
    // applying twice is harmless
    reconciler.apply(&entry).await.unwrap();

    assert_eq!(store.len().await.unwrap(), 1);
    assert_eq!(
        store.get(&record.message_id).await.unwrap(),
        Some(record.clone())
    );
    assert_eq!(
        cache.get(&record.cache_key("message:")).await.unwrap(),
        Some(bytes)
    );
}

#[tokio::test]
async fn test_reconciler_skips_cache_outside_window() {
    let dir = tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = Arc::new(SledStore::new(&db).unwrap());
    let cache = Arc::new(MemoryCache::new());
    let reconciler = Reconciler::new(
        store.clone(),
        cache.clone(),
        Duration::from_secs(600),
        "message:",
    );

    let (mut record, _) = record_bytes("old news");
    record.created_at -= chrono::Duration::minutes(30);
    let entry = LogEntry {
        offset: 0,
        key: "chat-key".into(),
        value: record.to_bytes().unwrap(),
    };

    reconciler.apply(&entry).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 1);
    assert!(cache.list_keys("message:").await.unwrap().is_empty());
}
