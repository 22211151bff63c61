use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    NotFound,
    Processing,
    Done,
}

/// Terminal result of one pass through the delivery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    Success,
    RetryPublished,
    SentToDlq,
    SkippedDuplicate,
    Quarantined,
    Requeued,
}

impl Display for ConsumeResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            ConsumeResult::Success => write!(f, "success"),
            ConsumeResult::RetryPublished => write!(f, "retry_published"),
            ConsumeResult::SentToDlq => write!(f, "sent_to_dlq"),
            ConsumeResult::SkippedDuplicate => write!(f, "skipped_duplicate"),
            ConsumeResult::Quarantined => write!(f, "quarantined"),
            ConsumeResult::Requeued => write!(f, "requeued"),
        }
    }
}

/// Who put a message on the dead-letter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DlqOrigin {
    /// Broker-driven: the message arrived without application headers.
    Automatic,
    /// Application-driven: the delivery engine dead-lettered it.
    Manual,
}

impl DlqOrigin {
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("manual") => DlqOrigin::Manual,
            _ => DlqOrigin::Automatic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DlqOrigin::Automatic => "automatic",
            DlqOrigin::Manual => "manual",
        }
    }
}

impl Display for DlqOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}
