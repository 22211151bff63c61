use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    #[serde(default = "default_main_exchange")]
    pub main_exchange: String,
    #[serde(default = "default_main_queue")]
    pub main_queue: String,
    #[serde(default = "default_main_routing_key")]
    pub main_routing_key: String,

    #[serde(default = "default_retry_exchange")]
    pub retry_exchange: String,
    #[serde(default = "default_retry_queue")]
    pub retry_queue: String,
    #[serde(default = "default_retry_routing_key")]
    pub retry_routing_key: String,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u32,

    #[serde(default = "default_dlq_exchange")]
    pub dlq_exchange: String,
    #[serde(default = "default_dlq_queue")]
    pub dlq_queue: String,
    #[serde(default = "default_dlq_routing_key")]
    pub dlq_routing_key: String,

    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,

    pub redis_url: String,
    #[serde(default = "default_processing_ttl_seconds")]
    pub processing_ttl_seconds: u64,
    #[serde(default = "default_done_ttl_seconds")]
    pub done_ttl_seconds: u64,

    #[serde(default = "default_overflow_list_key")]
    pub overflow_list_key: String,
    #[serde(default = "default_in_flight_list_key")]
    pub in_flight_list_key: String,
    #[serde(default = "default_quarantine_list_key")]
    pub quarantine_list_key: String,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default)]
    pub delivery_endpoint_url: Option<String>,
    #[serde(default = "default_delivery_timeout_seconds")]
    pub delivery_timeout_seconds: u64,
    #[serde(default = "default_simulated_failure_rate")]
    pub simulated_failure_rate: u8,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_replay_limit")]
    pub replay_default_limit: usize,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.done_ttl_seconds <= self.processing_ttl_seconds {
            return Err(anyhow!(
                "DONE_TTL_SECONDS ({}) must be longer than PROCESSING_TTL_SECONDS ({})",
                self.done_ttl_seconds,
                self.processing_ttl_seconds
            ));
        }

        if self.processing_ttl_seconds == 0 {
            return Err(anyhow!("PROCESSING_TTL_SECONDS must be greater than zero"));
        }

        if self.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be greater than zero"));
        }

        if self.simulated_failure_rate > 100 {
            return Err(anyhow!(
                "SIMULATED_FAILURE_RATE is a percentage, got {}",
                self.simulated_failure_rate
            ));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_main_exchange() -> String {
    "notification.main.exchange".to_string()
}

fn default_main_queue() -> String {
    "notification.main.queue".to_string()
}

fn default_main_routing_key() -> String {
    "notification.main".to_string()
}

fn default_retry_exchange() -> String {
    "notification.retry.exchange".to_string()
}

fn default_retry_queue() -> String {
    "notification.retry.queue".to_string()
}

fn default_retry_routing_key() -> String {
    "notification.retry".to_string()
}

fn default_retry_delay_ms() -> u32 {
    5000
}

fn default_dlq_exchange() -> String {
    "notification.dlq.exchange".to_string()
}

fn default_dlq_queue() -> String {
    "notification.dlq.queue".to_string()
}

fn default_dlq_routing_key() -> String {
    "notification.dlq".to_string()
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_processing_ttl_seconds() -> u64 {
    60
}

fn default_done_ttl_seconds() -> u64 {
    86_400
}

fn default_overflow_list_key() -> String {
    "notifications:dlq:list".to_string()
}

fn default_in_flight_list_key() -> String {
    "notifications:dlq:processing".to_string()
}

fn default_quarantine_list_key() -> String {
    "notifications:dlq:dead".to_string()
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    100
}

fn default_max_retry_delay_ms() -> u64 {
    2000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_delivery_timeout_seconds() -> u64 {
    10
}

fn default_simulated_failure_rate() -> u8 {
    80
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_replay_limit() -> usize {
    10
}

fn default_server_port() -> u16 {
    8080
}
