use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    clients::DeliveryStrategy,
    config::Config,
    models::{delivery::DeliveryOutcome, message::NotificationMessage},
};

pub fn from_config(config: &Config) -> Result<Arc<dyn DeliveryStrategy>, Error> {
    match &config.delivery_endpoint_url {
        Some(url) => Ok(Arc::new(HttpDelivery::new(
            url.clone(),
            Duration::from_secs(config.delivery_timeout_seconds),
        )?)),
        None => {
            info!(
                failure_rate = config.simulated_failure_rate,
                "No delivery endpoint configured, using simulated delivery"
            );
            Ok(Arc::new(SimulatedDelivery::new(config.simulated_failure_rate)))
        }
    }
}

/// Fails a configurable percentage of attempts at random.
pub struct SimulatedDelivery {
    failure_rate: u8,
}

impl SimulatedDelivery {
    pub fn new(failure_rate: u8) -> Self {
        Self {
            failure_rate: failure_rate.min(100),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for SimulatedDelivery {
    async fn attempt_delivery(&self, message: &NotificationMessage) -> DeliveryOutcome {
        if message.payload.trim().is_empty() {
            return DeliveryOutcome::Malformed("empty payload".to_string());
        }

        let roll: u8 = rand::random_range(0..100);
        if roll < self.failure_rate {
            DeliveryOutcome::Transient(format!("simulated failure (roll {})", roll))
        } else {
            DeliveryOutcome::Delivered
        }
    }
}

#[derive(Serialize)]
struct DeliveryRequest<'a> {
    id: &'a str,
    idempotency_key: &'a str,
    payload: &'a str,
}

/// POSTs each notification to a downstream HTTP endpoint.
pub struct HttpDelivery {
    http_client: Client,
    endpoint_url: String,
}

impl HttpDelivery {
    pub fn new(endpoint_url: String, timeout: Duration) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(endpoint = %endpoint_url, "HTTP delivery client initialized");

        Ok(Self {
            http_client,
            endpoint_url,
        })
    }

    fn classify(status: StatusCode) -> DeliveryOutcome {
        if status.is_success() {
            return DeliveryOutcome::Delivered;
        }

        match status {
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                DeliveryOutcome::Transient(format!("endpoint returned {}", status))
            }
            s if s.is_client_error() => {
                DeliveryOutcome::Malformed(format!("endpoint refused payload with {}", s))
            }
            s => DeliveryOutcome::Transient(format!("endpoint returned {}", s)),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for HttpDelivery {
    async fn attempt_delivery(&self, message: &NotificationMessage) -> DeliveryOutcome {
        debug!(
            idempotency_key = %message.idempotency_key,
            endpoint = %self.endpoint_url,
            "Sending notification"
        );

        let request = DeliveryRequest {
            id: &message.id,
            idempotency_key: &message.idempotency_key,
            payload: &message.payload,
        };

        match self
            .http_client
            .post(&self.endpoint_url)
            .header("Idempotency-Key", &message.idempotency_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => Self::classify(response.status()),
            Err(e) => DeliveryOutcome::Transient(format!("request failed: {}", e)),
        }
    }
}
