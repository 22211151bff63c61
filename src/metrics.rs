//! Observability handle for the delivery pipeline.
//!
//! [`NotificationMetrics`] is built once in `main` and passed to every
//! component as an `Arc`. Each record call emits through the `metrics` facade
//! (rendered by the Prometheus recorder when one is installed) and also bumps
//! an in-process total, so tests and shutdown logging can read exact values
//! without scraping.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use metrics::{counter, gauge, histogram};
use tracing::{info, trace};

use crate::models::status::{ConsumeResult, DlqOrigin};

const METRIC_PUBLISH: &str = "notify_publish_total";
const METRIC_SUCCESS: &str = "notify_success_total";
const METRIC_RETRY: &str = "notify_retry_total";
const METRIC_SKIP: &str = "notify_skip_total";
const METRIC_REQUEUE: &str = "notify_requeue_total";
const METRIC_REPLAY_SUCCESS: &str = "notify_replay_success_total";
const METRIC_POISON_PILL: &str = "notify_poison_pill_total";
const METRIC_DLQ_TOTAL: &str = "notify_dlq_total";
const METRIC_DEAD_COUNT: &str = "notify_dead_letter_count";
const METRIC_LATENCY: &str = "notify_processing_seconds";

#[derive(Debug, Default)]
pub struct NotificationMetrics {
    published: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    captured: AtomicU64,
    skipped: AtomicU64,
    requeued: AtomicU64,
    replayed: AtomicU64,
    poison_pills: AtomicU64,
    quarantine_size: AtomicU64,
    processed: AtomicU64,
    processing_nanos: AtomicU64,
}

/// Point-in-time copy of the in-process totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub succeeded: u64,
    pub retried: u64,
    /// Messages the delivery engine routed to the dead-letter exchange.
    pub dead_lettered: u64,
    /// Entries appended to the overflow buffer by dead-letter capture.
    pub captured: u64,
    pub skipped: u64,
    pub requeued: u64,
    pub replayed: u64,
    pub poison_pills: u64,
    pub quarantine_size: u64,
    pub processed: u64,
}

impl NotificationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_PUBLISH).increment(1);
    }

    pub fn record_result(&self, result: ConsumeResult) {
        trace!(result = %result, "Consume result recorded");

        match result {
            ConsumeResult::Success => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_SUCCESS).increment(1);
            }
            ConsumeResult::RetryPublished => {
                self.retried.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_RETRY).increment(1);
            }
            ConsumeResult::SkippedDuplicate => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_SKIP).increment(1);
            }
            ConsumeResult::Requeued => {
                self.requeued.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_REQUEUE).increment(1);
            }
            ConsumeResult::SentToDlq => {
                self.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            // Counted by record_poison_pill at the point of quarantine.
            ConsumeResult::Quarantined => {}
        }
    }

    /// Counts a message landing in the overflow buffer, labelled by who
    /// dead-lettered it and why.
    pub fn record_dlq(&self, origin: DlqOrigin, reason: &str) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        counter!(
            METRIC_DLQ_TOTAL,
            "origin" => origin.as_str(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    pub fn record_replay_success(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_REPLAY_SUCCESS).increment(1);
    }

    pub fn record_poison_pill(&self) {
        self.poison_pills.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_POISON_PILL).increment(1);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.processing_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        histogram!(METRIC_LATENCY).record(duration.as_secs_f64());
    }

    pub fn set_quarantine_size(&self, size: u64) {
        self.quarantine_size.store(size, Ordering::Relaxed);
        gauge!(METRIC_DEAD_COUNT).set(size as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            captured: self.captured.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            poison_pills: self.poison_pills.load(Ordering::Relaxed),
            quarantine_size: self.quarantine_size.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
        }
    }

    /// Writes the final totals to the log. Called once on shutdown.
    pub fn shutdown(&self) {
        let snapshot = self.snapshot();
        let processed = snapshot.processed.max(1);
        let mean_ms = self.processing_nanos.load(Ordering::Relaxed) / processed / 1_000_000;

        info!(
            published = snapshot.published,
            succeeded = snapshot.succeeded,
            retried = snapshot.retried,
            dead_lettered = snapshot.dead_lettered,
            captured = snapshot.captured,
            skipped = snapshot.skipped,
            requeued = snapshot.requeued,
            replayed = snapshot.replayed,
            poison_pills = snapshot.poison_pills,
            quarantine_size = snapshot.quarantine_size,
            mean_processing_ms = mean_ms,
            "Notification metrics flushed"
        );
    }
}
