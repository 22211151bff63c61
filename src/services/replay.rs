//! Operator-triggered replay of the overflow buffer.
//!
//! Entries are processed oldest first. Each one is claimed atomically, so two
//! concurrent replays never publish the same entry, and is only removed from
//! the buffer after its publish (or quarantine) succeeded. A failure puts the
//! entry back at the oldest end and stops the run.

use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::{error, info, warn};

use crate::{
    clients::{IdempotencyStore, OverflowBuffer, QuarantineBuffer},
    metrics::NotificationMetrics,
    models::message::{NotificationMessage, OverflowEntry},
    services::router::{RetryRouter, Route},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayOutcome {
    Replayed,
    Quarantined,
    /// The key is already `Done`; publishing again would deliver twice.
    AlreadyDelivered,
}

pub struct ReplayEngine {
    buffer: Arc<dyn OverflowBuffer>,
    quarantine: Arc<dyn QuarantineBuffer>,
    store: Arc<dyn IdempotencyStore>,
    router: RetryRouter,
    metrics: Arc<NotificationMetrics>,
}

impl ReplayEngine {
    pub fn new(
        buffer: Arc<dyn OverflowBuffer>,
        quarantine: Arc<dyn QuarantineBuffer>,
        store: Arc<dyn IdempotencyStore>,
        router: RetryRouter,
        metrics: Arc<NotificationMetrics>,
    ) -> Self {
        Self {
            buffer,
            quarantine,
            store,
            router,
            metrics,
        }
    }

    /// Examines up to `limit` entries and returns how many were published
    /// back to the main queue. Quarantined and already-delivered entries are
    /// removed but not counted.
    pub async fn replay(&self, limit: usize) -> usize {
        let mut replayed = 0;

        for _ in 0..limit {
            let entry = match self.buffer.claim_oldest().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to claim overflow entry, stopping replay");
                    break;
                }
            };

            let outcome = match self.apply(&entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Replay failed, returning entry to buffer");
                    if let Err(restore_err) = self.buffer.restore(&entry).await {
                        error!(
                            error = %restore_err,
                            "Failed to restore entry; it will be recovered on restart"
                        );
                    }
                    break;
                }
            };

            let acknowledged = self.buffer.acknowledge(&entry).await;

            if outcome == ReplayOutcome::Replayed {
                replayed += 1;
                self.metrics.record_replay_success();
            }

            if let Err(e) = acknowledged {
                // Already published or quarantined; restoring would repeat it.
                match outcome {
                    ReplayOutcome::Quarantined => error!(
                        error = %e,
                        "event=notify_quarantine_unacknowledged, entry left in flight, stopping replay"
                    ),
                    _ => error!(error = %e, "Failed to acknowledge replayed entry, stopping replay"),
                }
                break;
            }
        }

        info!(replayed, limit, "event=notify_replay_complete");
        replayed
    }

    async fn apply(&self, entry: &str) -> Result<ReplayOutcome, Error> {
        let message = match decode_entry(entry) {
            Ok(message) => message,
            Err(raw) => {
                error!(entry = %raw, "event=notify_poison_pill, quarantining overflow entry");
                let size = self.quarantine.quarantine(&raw).await?;
                self.metrics.record_poison_pill();
                self.metrics.set_quarantine_size(size);
                return Ok(ReplayOutcome::Quarantined);
            }
        };

        if !self.store.release_unless_done(&message.idempotency_key).await? {
            warn!(
                idempotency_key = %message.idempotency_key,
                "Skipping replay of already delivered message"
            );
            return Ok(ReplayOutcome::AlreadyDelivered);
        }

        let fresh = message.with_retry_count(0);
        self.router.route(&fresh, Route::Replay).await?;

        info!(
            idempotency_key = %fresh.idempotency_key,
            previous_retry_count = message.retry_count,
            "event=notify_replayed"
        );
        Ok(ReplayOutcome::Replayed)
    }
}

/// Unwraps an overflow entry down to its message. On failure returns the
/// most specific text to quarantine: the staged body when the envelope
/// decodes, otherwise the entry itself.
fn decode_entry(entry: &str) -> Result<NotificationMessage, String> {
    match serde_json::from_str::<OverflowEntry>(entry) {
        Ok(envelope) => envelope.message().map_err(|_| envelope.payload),
        // Bare messages pushed straight onto the list are accepted too.
        Err(_) => NotificationMessage::decode(entry.as_bytes()).map_err(|_| entry.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status::DlqOrigin;

    #[test]
    fn test_decode_entry_unwraps_envelope() {
        let message = NotificationMessage::new("n-1".into(), "k1".into(), "hello".into());
        let envelope = OverflowEntry::new(
            serde_json::to_string(&message).unwrap(),
            DlqOrigin::Manual,
            "retry_exceeded".into(),
            Some(4),
        );

        let decoded = decode_entry(&serde_json::to_string(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_entry_quarantines_inner_payload() {
        let envelope = OverflowEntry::new("{ broken".into(), DlqOrigin::Automatic, "unknown".into(), None);

        let raw = decode_entry(&serde_json::to_string(&envelope).unwrap()).unwrap_err();
        assert_eq!(raw, "{ broken");
    }

    #[test]
    fn test_decode_entry_accepts_bare_message() {
        let entry = r#"{"id":"n-1","retry_count":4,"idempotency_key":"k1","payload":"hello"}"#;

        let decoded = decode_entry(entry).unwrap();
        assert_eq!(decoded.retry_count, 4);
    }

    #[test]
    fn test_decode_entry_keeps_garbage_verbatim() {
        assert_eq!(decode_entry("garbage").unwrap_err(), "garbage");
    }
}
