use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{OverflowBuffer, QuarantineBuffer, rbmq::RabbitMqClient, redis::RedisClient},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    redis: Arc<RedisClient>,
    rabbitmq: Arc<RabbitMqClient>,
}

impl HealthChecker {
    pub fn new(redis: Arc<RedisClient>, rabbitmq: Arc<RabbitMqClient>) -> Self {
        Self { redis, rabbitmq }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("cache_service".to_string(), self.check_redis().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq());
        checks.insert("dead_letters".to_string(), self.check_dead_letters().await);

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.redis.ping().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Redis health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    fn check_rabbitmq(&self) -> ServiceHealth {
        if self.rabbitmq.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ channel is not connected");
            ServiceHealth::unhealthy("Channel disconnected".to_string())
        }
    }

    async fn check_dead_letters(&self) -> ServiceHealth {
        let pending = self.redis.pending_size().await;
        let quarantined = self.redis.size().await;

        match (pending, quarantined) {
            (Ok(pending), Ok(0)) => {
                ServiceHealth::healthy(0).with_detail(format!("{} pending replay", pending))
            }
            (Ok(pending), Ok(quarantined)) => ServiceHealth {
                status: HealthStatus::Degraded,
                response_time_ms: None,
                detail: Some(format!(
                    "{} pending replay, {} quarantined",
                    pending, quarantined
                )),
                error: None,
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to read dead-letter buffers");
                ServiceHealth::unhealthy(format!("Cannot read buffers: {}", e))
            }
        }
    }
}

fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let critical_unhealthy = checks
        .iter()
        .filter(|(name, _)| name.as_str() == "cache_service" || name.as_str() == "message_broker")
        .any(|(_, health)| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status != HealthStatus::Healthy);

    if critical_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
