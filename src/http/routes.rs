use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::analysis::StopFlag;
use crate::dispatch::ConnectionHealth;
use crate::engine::core::PipelineHandle;
use crate::telemetry::{MetricEvent, TelemetryHub, TelemetrySnapshot};

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct DebugHttpState {
    telemetry: Arc<TelemetryHub>,
    health: watch::Receiver<ConnectionHealth>,
    stop: StopFlag,
    started: Instant,
    token: Arc<String>,
}

impl DebugHttpState {
    pub fn new(
        telemetry: Arc<TelemetryHub>,
        health: watch::Receiver<ConnectionHealth>,
        stop: StopFlag,
        token: String,
    ) -> Self {
        Self {
            telemetry,
            health,
            stop,
            started: Instant::now(),
            token: Arc::new(token),
        }
    }

    pub fn from_handle(handle: &PipelineHandle, token: String) -> Self {
        Self::new(
            handle.telemetry_hub(),
            handle.subscribe_health(),
            handle.stop_flag(),
            token,
        )
    }

    fn authorize(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        let provided = extract_token(headers, query_token);
        match provided {
            Some(value) if value == *self.token => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token"),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sink: ConnectionHealth,
    pub stop_requested: bool,
    pub uptime_ms: u64,
}

/// Metrics endpoint response payload.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub latest_classification: Option<MetricEvent>,
    pub diagnostics: TelemetrySnapshot,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding debug HTTP listener")?;
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .context("serving debug HTTP router")?;
    Ok(())
}

pub async fn health(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<HealthResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    Ok(Json(HealthResponse {
        status: "ok",
        sink: *state.health.borrow(),
        stop_requested: state.stop.is_stopped(),
        uptime_ms: state.started.elapsed().as_millis() as u64,
    }))
}

pub async fn metrics(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<MetricsResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    let diagnostics = state.telemetry.snapshot();
    let latest_classification = diagnostics
        .recent
        .iter()
        .rev()
        .find(|event| matches!(event, MetricEvent::Classification { .. }))
        .cloned();

    Ok(Json(MetricsResponse {
        latest_classification,
        diagnostics,
    }))
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_DEBUG_TOKEN: HeaderName = HeaderName::from_static("x-debug-token");

    headers
        .get(&X_DEBUG_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}
