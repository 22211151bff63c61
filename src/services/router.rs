use std::sync::Arc;

use anyhow::{Error, Result};

use crate::{
    clients::MessagePublisher,
    models::{
        message::NotificationMessage,
        routing::{Destination, MessageHeaders},
        status::DlqOrigin,
    },
};

/// Where a message goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Fresh publish into the main queue.
    Main,
    /// Operator-triggered re-injection into the main queue.
    Replay,
    /// Delayed retry; the broker returns it to main after the retry TTL.
    Retry,
    DeadLetter { origin: DlqOrigin, reason: String },
}

/// Maps a routing decision onto a destination and provenance headers.
///
/// The retry count carried in the headers is always the count already set on
/// `message`; callers bump or reset it before routing.
#[derive(Clone)]
pub struct RetryRouter {
    publisher: Arc<dyn MessagePublisher>,
}

impl RetryRouter {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }

    pub async fn route(&self, message: &NotificationMessage, route: Route) -> Result<(), Error> {
        let (destination, headers) = match route {
            Route::Main => (Destination::Main, MessageHeaders::default()),
            Route::Replay => (Destination::Main, MessageHeaders::replay()),
            Route::Retry => (
                Destination::Retry,
                MessageHeaders::retry(message.retry_count),
            ),
            Route::DeadLetter { origin, reason } => (
                Destination::DeadLetter,
                MessageHeaders::dead_letter(origin, &reason, message.retry_count),
            ),
        };

        self.publisher.publish(destination, message, &headers).await
    }
}
