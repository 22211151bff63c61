//! Delivery attempt engine.
//!
//! One call to [`DeliveryEngine::process`] takes a message from the main
//! queue through dedup, delivery and routing:
//!
//! ```text
//! try_acquire ──false──▶ SkippedDuplicate
//!      │true
//!      ▼
//! attempt_delivery ──Delivered──▶ mark_done ──▶ Success
//!      ├──Malformed──▶ quarantine (key kept) ──▶ Quarantined
//!      └──Transient──▶ release ──▶ retry_count + 1 > max ? SentToDlq : RetryPublished
//! ```
//!
//! Errors raised after the key was acquired are handled as transient
//! failures. Errors that leave the message unroutable are returned to the
//! caller, which hands the delivery back to the broker.

use std::{sync::Arc, time::Instant};

use anyhow::{Error, Result};
use tracing::{error, info, warn};

use crate::{
    clients::{DeliveryStrategy, IdempotencyStore, QuarantineBuffer},
    metrics::NotificationMetrics,
    models::{
        delivery::DeliveryOutcome,
        message::NotificationMessage,
        routing::REASON_RETRY_EXCEEDED,
        status::{ConsumeResult, DlqOrigin},
    },
    services::router::{RetryRouter, Route},
    utils::body_text,
};

enum Attempt {
    Finished(ConsumeResult),
    Failed(String),
}

pub struct DeliveryEngine {
    store: Arc<dyn IdempotencyStore>,
    delivery: Arc<dyn DeliveryStrategy>,
    router: RetryRouter,
    quarantine: Arc<dyn QuarantineBuffer>,
    metrics: Arc<NotificationMetrics>,
    max_retry_count: u32,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        delivery: Arc<dyn DeliveryStrategy>,
        router: RetryRouter,
        quarantine: Arc<dyn QuarantineBuffer>,
        metrics: Arc<NotificationMetrics>,
        max_retry_count: u32,
    ) -> Self {
        Self {
            store,
            delivery,
            router,
            quarantine,
            metrics,
            max_retry_count,
        }
    }

    /// Entry point for raw broker bodies. Bodies that do not decode are
    /// poison pills and go straight to quarantine.
    pub async fn process_raw(&self, body: &[u8]) -> Result<ConsumeResult, Error> {
        match NotificationMessage::decode(body) {
            Ok(message) => self.process(&message).await,
            Err(e) => {
                let start = Instant::now();
                let raw = body_text(body);
                error!(error = %e, "event=notify_decode_failed, quarantining body");

                let result = self
                    .quarantine_raw(&raw)
                    .await
                    .map(|_| ConsumeResult::Quarantined);
                self.record(&result, start);
                result
            }
        }
    }

    pub async fn process(&self, message: &NotificationMessage) -> Result<ConsumeResult, Error> {
        let start = Instant::now();

        info!(
            idempotency_key = %message.idempotency_key,
            retry_count = message.retry_count,
            "event=notify_consume_start"
        );

        let result = self.run(message).await;
        self.record(&result, start);
        result
    }

    fn record(&self, result: &Result<ConsumeResult, Error>, start: Instant) {
        let outcome = match result {
            Ok(outcome) => *outcome,
            Err(_) => ConsumeResult::Requeued,
        };
        self.metrics.record_result(outcome);
        self.metrics.record_duration(start.elapsed());
    }

    async fn run(&self, message: &NotificationMessage) -> Result<ConsumeResult, Error> {
        // Nothing is held yet, so a store outage goes straight back to the broker.
        if !self.store.try_acquire(&message.idempotency_key).await? {
            warn!(
                idempotency_key = %message.idempotency_key,
                retry_count = message.retry_count,
                "event=notify_duplicate_skip"
            );
            return Ok(ConsumeResult::SkippedDuplicate);
        }

        match self.attempt(message).await {
            Ok(Attempt::Finished(result)) => Ok(result),
            Ok(Attempt::Failed(reason)) => self.fail_transient(message, &reason).await,
            Err(e) => {
                warn!(
                    idempotency_key = %message.idempotency_key,
                    error = %e,
                    "Attempt raised an unexpected error, handling as transient"
                );
                self.fail_transient(message, &e.to_string()).await
            }
        }
    }

    async fn attempt(&self, message: &NotificationMessage) -> Result<Attempt, Error> {
        match self.delivery.attempt_delivery(message).await {
            DeliveryOutcome::Delivered => {
                self.store.mark_done(&message.idempotency_key).await?;

                info!(
                    idempotency_key = %message.idempotency_key,
                    retry_count = message.retry_count,
                    "event=notify_success"
                );
                Ok(Attempt::Finished(ConsumeResult::Success))
            }
            DeliveryOutcome::Malformed(reason) => {
                // The key stays acquired so no copy of this message is retried.
                error!(
                    idempotency_key = %message.idempotency_key,
                    reason = %reason,
                    "event=notify_poison_pill"
                );

                let raw = serde_json::to_string(message)?;
                self.quarantine_raw(&raw).await?;
                Ok(Attempt::Finished(ConsumeResult::Quarantined))
            }
            DeliveryOutcome::Transient(reason) => Ok(Attempt::Failed(reason)),
        }
    }

    async fn fail_transient(
        &self,
        message: &NotificationMessage,
        reason: &str,
    ) -> Result<ConsumeResult, Error> {
        if let Err(e) = self.store.release(&message.idempotency_key).await {
            // Routing still goes ahead; the key expires after the processing TTL.
            error!(
                idempotency_key = %message.idempotency_key,
                error = %e,
                "Failed to release idempotency key"
            );
        }

        // Counts arriving at or past the limit are treated as exhausted.
        let next_retry = message
            .retry_count
            .saturating_add(1)
            .min(self.max_retry_count.saturating_add(1));
        let next = message.with_retry_count(next_retry);

        if next_retry > self.max_retry_count {
            self.router
                .route(
                    &next,
                    Route::DeadLetter {
                        origin: DlqOrigin::Manual,
                        reason: REASON_RETRY_EXCEEDED.to_string(),
                    },
                )
                .await?;

            error!(
                idempotency_key = %message.idempotency_key,
                retry_count = next_retry,
                reason = %reason,
                "event=notify_dead_lettered"
            );
            return Ok(ConsumeResult::SentToDlq);
        }

        self.router.route(&next, Route::Retry).await?;

        warn!(
            idempotency_key = %message.idempotency_key,
            retry_count = message.retry_count,
            next_retry,
            reason = %reason,
            "event=notify_retry_published"
        );
        Ok(ConsumeResult::RetryPublished)
    }

    async fn quarantine_raw(&self, raw: &str) -> Result<(), Error> {
        let size = self.quarantine.quarantine(raw).await?;
        self.metrics.record_poison_pill();
        self.metrics.set_quarantine_size(size);
        Ok(())
    }
}
