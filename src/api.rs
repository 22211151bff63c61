use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::{OverflowBuffer, QuarantineBuffer, health::HealthChecker},
    models::{
        health::{HealthCheckResponse, HealthStatus},
        message::{DlqStats, PublishRequest, PublishStatus, ReplayParams},
        response::ApiResponse,
    },
    services::{publish::PublishService, replay::ReplayEngine},
};

pub struct AppState {
    publish: Arc<PublishService>,
    replay: Arc<ReplayEngine>,
    overflow: Arc<dyn OverflowBuffer>,
    quarantine: Arc<dyn QuarantineBuffer>,
    default_replay_limit: usize,
    health_checker: Option<HealthChecker>,
    prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        publish: Arc<PublishService>,
        replay: Arc<ReplayEngine>,
        overflow: Arc<dyn OverflowBuffer>,
        quarantine: Arc<dyn QuarantineBuffer>,
        default_replay_limit: usize,
    ) -> Self {
        Self {
            publish,
            replay,
            overflow,
            quarantine,
            default_replay_limit,
            health_checker: None,
            prometheus: None,
        }
    }

    pub fn with_health_checker(mut self, health_checker: HealthChecker) -> Self {
        self.health_checker = Some(health_checker);
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/notifications", post(publish_notification))
        .route("/api/notifications/replay", post(replay_dead_letters))
        .route("/api/notifications/dlq", get(dead_letter_stats))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(state: Arc<AppState>, port: u16) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn publish_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishRequest>,
) -> impl IntoResponse {
    let response = state
        .publish
        .publish(request.payload, request.idempotency_key)
        .await;

    match response.status {
        PublishStatus::Queued => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                response,
                "Notification queued".to_string(),
            )),
        ),
        PublishStatus::Failed => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::failure(
                response,
                "Broker unavailable".to_string(),
                "Notification was not queued".to_string(),
            )),
        ),
    }
}

async fn replay_dead_letters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReplayParams>,
) -> String {
    let limit = params.limit.unwrap_or(state.default_replay_limit);
    let replayed = state.replay.replay(limit).await;

    format!("{} messages replayed from Redis to main queue.", replayed)
}

async fn dead_letter_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = async {
        Ok::<_, Error>(DlqStats {
            pending: state.overflow.pending_size().await?,
            in_flight: state.overflow.in_flight_size().await?,
            quarantined: state.quarantine.size().await?,
        })
    }
    .await;

    match stats {
        Ok(stats) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                stats,
                "Dead-letter buffer sizes".to_string(),
            )),
        ),
        Err(e) => {
            error!(error = %e, "Failed to read dead-letter buffers");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(
                    e.to_string(),
                    "Dead-letter buffers unavailable".to_string(),
                )),
            )
        }
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = match &state.health_checker {
        Some(checker) => checker.check_all().await,
        None => HealthCheckResponse {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            checks: HashMap::new(),
        },
    };

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "No metrics recorder installed".to_string(),
        ),
    }
}
