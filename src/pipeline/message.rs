//! Message definitions for the ingestion pipeline
//!
//! `MessageSubmission` is what clients send, over HTTP or a live
//! connection. `MessageRecord` is the canonical form produced at ingestion;
//! the same record (same `message_id`) is what lands in the store, the
//! cache and the durable log.
//!
//! Notes on fields:
//! - `message_id`: UUID v4 assigned once at ingestion; idempotency key
//! - `sender_id` / `receiver_id`: opaque participant ids, never validated
//! - `created_at`: UTC, strictly increasing within one process

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::{ChatError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSubmission {
    #[serde(alias = "senderId")]
    pub sender_id: i64,
    #[serde(alias = "receiverId")]
    pub receiver_id: i64,
    pub content: String,
}

impl MessageSubmission {
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: Uuid,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Assigns a fresh identity and timestamp to a submission.
    pub fn assign(submission: MessageSubmission) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            sender_id: submission.sender_id,
            receiver_id: submission.receiver_id,
            content: submission.content,
            created_at: next_timestamp(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Checks the fields a consumer relies on before applying side effects.
    /// Content is arbitrary text; an empty string is a valid message.
    pub fn validate(&self) -> Result<()> {
        if self.message_id.is_nil() {
            return Err(ChatError::Validation("nil message_id".into()));
        }
        Ok(())
    }

    /// Cache key for this record under `prefix`.
    pub fn cache_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.message_id)
    }
}

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Wall-clock time, nudged forward by a microsecond whenever the clock has
/// not advanced since the previous call (or went backwards).
pub fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_TIMESTAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match LAST_TIMESTAMP_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(actual) => prev = actual,
        }
    }
}
