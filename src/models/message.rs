use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::status::DlqOrigin;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: String,

    #[serde(default)]
    pub retry_count: u32,

    pub idempotency_key: String,
    pub payload: String,
}

impl NotificationMessage {
    pub fn new(id: String, idempotency_key: String, payload: String) -> Self {
        Self {
            id,
            retry_count: 0,
            idempotency_key,
            payload,
        }
    }

    /// Decodes a broker body. A message without an idempotency key cannot be
    /// deduplicated and is rejected the same way as undecodable JSON.
    pub fn decode(body: &[u8]) -> Result<Self, Error> {
        let message: Self = serde_json::from_slice(body)?;

        if message.idempotency_key.trim().is_empty() {
            return Err(anyhow!("Message {} has no idempotency key", message.id));
        }

        Ok(message)
    }

    pub fn with_retry_count(&self, retry_count: u32) -> Self {
        Self {
            retry_count,
            ..self.clone()
        }
    }
}

/// A dead-lettered message staged in the overflow buffer.
///
/// The original body is kept as a string rather than a decoded
/// [`NotificationMessage`] so that bodies which never decoded can still be
/// staged and later quarantined by replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverflowEntry {
    pub payload: String,
    pub origin: DlqOrigin,
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    pub dead_lettered_at: DateTime<Utc>,
}

impl OverflowEntry {
    pub fn new(payload: String, origin: DlqOrigin, reason: String, retry_count: Option<u32>) -> Self {
        Self {
            payload,
            origin,
            reason,
            retry_count,
            dead_lettered_at: Utc::now(),
        }
    }

    /// Decodes the staged body back into a message.
    pub fn message(&self) -> Result<NotificationMessage, Error> {
        NotificationMessage::decode(self.payload.as_bytes())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub payload: String,

    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub notification_id: String,
    pub idempotency_key: String,
    pub status: PublishStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Queued,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqStats {
    pub pending: u64,
    pub in_flight: u64,
    pub quarantined: u64,
}
