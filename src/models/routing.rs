use crate::models::status::DlqOrigin;

pub const HEADER_ORIGIN: &str = "x-origin";
pub const HEADER_RETRY_COUNT: &str = "x-retry-count";
pub const HEADER_DLQ_ORIGIN: &str = "x-dlq-origin";
pub const HEADER_DLQ_REASON: &str = "x-dlq-reason";
pub const HEADER_REPLAY: &str = "x-replay";
pub const HEADER_REPLAY_ORIGIN: &str = "x-replay-origin";

pub const REASON_RETRY_EXCEEDED: &str = "retry_exceeded";

/// Exchange/routing-key pair a message can be published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Main,
    Retry,
    DeadLetter,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Main => "main",
            Destination::Retry => "retry",
            Destination::DeadLetter => "dlq",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginTag {
    Retry,
    DeadLetter(DlqOrigin),
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Number(i64),
    Flag(bool),
}

/// Provenance attached to an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub origin: Option<OriginTag>,
    pub reason: Option<String>,
    pub retry_count: Option<u32>,
}

impl MessageHeaders {
    pub fn retry(retry_count: u32) -> Self {
        Self {
            origin: Some(OriginTag::Retry),
            reason: None,
            retry_count: Some(retry_count),
        }
    }

    pub fn dead_letter(origin: DlqOrigin, reason: &str, retry_count: u32) -> Self {
        Self {
            origin: Some(OriginTag::DeadLetter(origin)),
            reason: Some(reason.to_string()),
            retry_count: Some(retry_count),
        }
    }

    pub fn replay() -> Self {
        Self {
            origin: Some(OriginTag::Replay),
            reason: None,
            retry_count: Some(0),
        }
    }

    pub fn entries(&self) -> Vec<(&'static str, HeaderValue)> {
        let mut entries = Vec::new();

        match self.origin {
            Some(OriginTag::Retry) => {
                entries.push((HEADER_ORIGIN, HeaderValue::Text("retry".to_string())));
            }
            Some(OriginTag::DeadLetter(origin)) => {
                entries.push((HEADER_DLQ_ORIGIN, HeaderValue::Text(origin.to_string())));
            }
            Some(OriginTag::Replay) => {
                entries.push((HEADER_REPLAY, HeaderValue::Flag(true)));
                entries.push((HEADER_REPLAY_ORIGIN, HeaderValue::Text("redis".to_string())));
            }
            None => {}
        }

        if let Some(reason) = &self.reason {
            entries.push((HEADER_DLQ_REASON, HeaderValue::Text(reason.clone())));
        }

        if let Some(retry_count) = self.retry_count {
            entries.push((HEADER_RETRY_COUNT, HeaderValue::Number(retry_count as i64)));
        }

        entries
    }
}
