use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::{
    metrics::NotificationMetrics,
    models::message::{NotificationMessage, PublishResponse, PublishStatus},
    services::router::{RetryRouter, Route},
};

/// Accepts new notifications and publishes them to the main queue.
pub struct PublishService {
    router: RetryRouter,
    metrics: Arc<NotificationMetrics>,
}

impl PublishService {
    pub fn new(router: RetryRouter, metrics: Arc<NotificationMetrics>) -> Self {
        Self { router, metrics }
    }

    /// Publishes `payload` under a fresh id. Without a usable idempotency
    /// key the id doubles as the key. Transport failures are reported in the
    /// response status rather than as an error.
    pub async fn publish(&self, payload: String, idempotency_key: Option<String>) -> PublishResponse {
        let notification_id = Uuid::new_v4().to_string();
        let idempotency_key = idempotency_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| notification_id.clone());

        let message = NotificationMessage::new(notification_id.clone(), idempotency_key.clone(), payload);
        self.metrics.record_publish();

        let status = match self.router.route(&message, Route::Main).await {
            Ok(()) => {
                info!(
                    notification_id = %notification_id,
                    idempotency_key = %idempotency_key,
                    "event=notify_published"
                );
                PublishStatus::Queued
            }
            Err(e) => {
                error!(
                    notification_id = %notification_id,
                    idempotency_key = %idempotency_key,
                    error = %e,
                    "Failed to publish notification"
                );
                PublishStatus::Failed
            }
        };

        PublishResponse {
            notification_id,
            idempotency_key,
            status,
        }
    }
}
