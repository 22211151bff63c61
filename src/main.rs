use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use metrics_exporter_prometheus::PrometheusBuilder;
use notification_relay::{
    api::{AppState, run_api_server},
    clients::{
        IdempotencyStore, MessagePublisher, OverflowBuffer, QuarantineBuffer, delivery,
        health::HealthChecker, rbmq::RabbitMqClient, redis::RedisClient,
    },
    config::Config,
    metrics::NotificationMetrics,
    services::{
        consumer::DeliveryEngine, dead_letter::DeadLetterCapture, publish::PublishService,
        replay::ReplayEngine, router::RetryRouter,
    },
    worker::{run_dead_letter_worker, run_delivery_worker},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("Failed to install metrics recorder: {}", e))?;
    let metrics = Arc::new(NotificationMetrics::new());

    let redis = Arc::new(RedisClient::connect(&config).await?);
    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);

    let store: Arc<dyn IdempotencyStore> = redis.clone();
    let overflow: Arc<dyn OverflowBuffer> = redis.clone();
    let quarantine: Arc<dyn QuarantineBuffer> = redis.clone();
    let publisher: Arc<dyn MessagePublisher> = rabbitmq.clone();

    // Entries claimed by a replay that never finished go back to the front.
    let recovered = overflow.recover_in_flight().await?;
    if recovered > 0 {
        warn!(recovered, "Recovered in-flight overflow entries");
    }
    metrics.set_quarantine_size(quarantine.size().await?);

    let router = RetryRouter::new(publisher);

    let engine = Arc::new(DeliveryEngine::new(
        Arc::clone(&store),
        delivery::from_config(&config)?,
        router.clone(),
        Arc::clone(&quarantine),
        Arc::clone(&metrics),
        config.max_retry_count,
    ));
    let capture = Arc::new(DeadLetterCapture::new(
        Arc::clone(&overflow),
        Arc::clone(&metrics),
    ));
    let replay = Arc::new(ReplayEngine::new(
        Arc::clone(&overflow),
        Arc::clone(&quarantine),
        store,
        router.clone(),
        Arc::clone(&metrics),
    ));
    let publish = Arc::new(PublishService::new(router, Arc::clone(&metrics)));

    let state = Arc::new(
        AppState::new(
            publish,
            replay,
            overflow,
            quarantine,
            config.replay_default_limit,
        )
        .with_health_checker(HealthChecker::new(Arc::clone(&redis), Arc::clone(&rabbitmq)))
        .with_prometheus(prometheus),
    );

    info!(
        max_retry_count = config.max_retry_count,
        retry_delay_ms = config.retry_delay_ms,
        concurrency = config.worker_concurrency,
        "Notification relay starting"
    );

    let result = tokio::select! {
        result = run_delivery_worker(Arc::clone(&rabbitmq), engine, config.worker_concurrency) => result,
        result = run_dead_letter_worker(Arc::clone(&rabbitmq), capture) => result,
        result = run_api_server(state, config.server_port) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Notification relay stopped with an error");
    }

    metrics.shutdown();

    result
}
