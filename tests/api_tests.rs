use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use notification_relay::{
    api::{AppState, router},
    models::{delivery::DeliveryOutcome, routing::Destination},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::support::{Harness, message};

async fn serve(harness: &Harness) -> Result<SocketAddr> {
    let state = Arc::new(AppState::new(
        harness.publish.clone(),
        harness.replay.clone(),
        harness.overflow.clone(),
        harness.quarantine.clone(),
        10,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.ok();
    });

    Ok(addr)
}

/// Test: Publishing over HTTP queues the notification
#[tokio::test]
async fn test_publish_endpoint_accepts_notification() -> Result<()> {
    let harness = Harness::new(3, DeliveryOutcome::Delivered);
    let addr = serve(&harness).await?;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/notifications", addr))
        .json(&json!({ "payload": "hello", "idempotency_key": "k1" }))
        .send()
        .await?;

    assert_eq!(response.status(), 202);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["idempotency_key"], "k1");
    assert_eq!(body["data"]["status"], "queued");
    assert_eq!(harness.broker.depth(Destination::Main).await, 1);

    Ok(())
}

/// Test: A broker outage surfaces as 503 with the failed status
#[tokio::test]
async fn test_publish_endpoint_reports_outage() -> Result<()> {
    let harness = Harness::new(3, DeliveryOutcome::Delivered);
    harness.broker.set_unavailable(true);
    let addr = serve(&harness).await?;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/notifications", addr))
        .json(&json!({ "payload": "hello" }))
        .send()
        .await?;

    assert_eq!(response.status(), 503);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["status"], "failed");

    Ok(())
}

/// Test: The replay endpoint reports how many messages went back to main
#[tokio::test]
async fn test_replay_endpoint_reports_count() -> Result<()> {
    let harness = Harness::new(3, DeliveryOutcome::Delivered);
    for id in ["a", "b", "c"] {
        harness.stage(&message(id, &format!("k-{}", id), "hello")).await?;
    }
    let addr = serve(&harness).await?;
    let client = reqwest::Client::new();

    let text = client
        .post(format!("http://{}/api/notifications/replay?limit=2", addr))
        .send()
        .await?
        .text()
        .await?;
    assert_eq!(text, "2 messages replayed from Redis to main queue.");

    let text = client
        .post(format!("http://{}/api/notifications/replay", addr))
        .send()
        .await?
        .text()
        .await?;
    assert_eq!(text, "1 messages replayed from Redis to main queue.");

    Ok(())
}

/// Test: Buffer sizes are exposed for operators
#[tokio::test]
async fn test_dlq_endpoint_reports_sizes() -> Result<()> {
    let harness = Harness::new(3, DeliveryOutcome::Delivered);
    harness.stage(&message("n-1", "k1", "hello")).await?;
    harness.engine.process_raw(b"garbage").await?;
    let addr = serve(&harness).await?;

    let body: Value = reqwest::get(format!("http://{}/api/notifications/dlq", addr))
        .await?
        .json()
        .await?;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["pending"], 1);
    assert_eq!(body["data"]["in_flight"], 0);
    assert_eq!(body["data"]["quarantined"], 1);

    Ok(())
}

/// Test: Health and metrics routes respond without external services
#[tokio::test]
async fn test_health_and_metrics_routes() -> Result<()> {
    let harness = Harness::new(3, DeliveryOutcome::Delivered);
    let addr = serve(&harness).await?;

    let health = reqwest::get(format!("http://{}/health", addr)).await?;
    assert_eq!(health.status(), 200);
    let body: Value = health.json().await?;
    assert_eq!(body["status"], "healthy");

    let metrics = reqwest::get(format!("http://{}/metrics", addr)).await?;
    assert_eq!(metrics.status(), 404);

    Ok(())
}
