use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::error;

use crate::{
    clients::OverflowBuffer,
    metrics::NotificationMetrics,
    models::{message::OverflowEntry, status::DlqOrigin},
    utils::body_text,
};

/// Drains the dead-letter queue into the overflow buffer.
pub struct DeadLetterCapture {
    buffer: Arc<dyn OverflowBuffer>,
    metrics: Arc<NotificationMetrics>,
}

impl DeadLetterCapture {
    pub fn new(buffer: Arc<dyn OverflowBuffer>, metrics: Arc<NotificationMetrics>) -> Self {
        Self { buffer, metrics }
    }

    /// Stages one dead-lettered body and returns the pending buffer length.
    ///
    /// The body is kept verbatim whether or not it decodes (non-UTF-8 bodies
    /// go through [`body_text`]); replay decides what to do with it. An error
    /// means nothing was appended and the caller must keep the broker message.
    pub async fn capture(
        &self,
        raw: &[u8],
        origin: DlqOrigin,
        reason: &str,
        retry_count: Option<u32>,
    ) -> Result<u64, Error> {
        let payload = body_text(raw).into_owned();
        let entry = OverflowEntry::new(payload, origin, reason.to_string(), retry_count);
        let serialized = serde_json::to_string(&entry)?;

        let pending = self.buffer.append(&serialized).await?;
        self.metrics.record_dlq(origin, reason);

        error!(
            origin = %origin,
            reason = %reason,
            retry_count = ?retry_count,
            pending,
            "event=notify_dlq_captured"
        );

        Ok(pending)
    }
}
