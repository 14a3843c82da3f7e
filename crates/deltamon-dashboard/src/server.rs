//! HTTP server implementation using axum.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use deltamon_scanner::{EngineSnapshot, EngineState, MonitorEngine};
use deltamon_telemetry::render_metrics;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<MonitorEngine>,
    config: Arc<DashboardConfig>,
}

impl AppState {
    pub fn new(engine: Arc<MonitorEngine>, config: DashboardConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, `degraded` (some accounts unreachable) or `down`.
    pub status: &'static str,
    pub state: EngineState,
    pub generation: u64,
    pub accounts: usize,
    pub unreachable: usize,
    pub cycles_completed: u64,
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Serve the index HTML page.
async fn serve_index(State(state): State<AppState>, headers: HeaderMap) -> Result<Html<&'static str>, Response> {
    authorize(&state, &headers)?;
    Ok(Html(include_str!("../static/index.html")))
}

/// Get current engine snapshot as JSON.
async fn get_snapshot(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<EngineSnapshot>, Response> {
    authorize(&state, &headers)?;
    Ok(Json(state.engine.snapshot()))
}

/// Liveness summary. Unauthenticated so probes can reach it.
async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let engine_state = state.engine.state();
    let generation = state.engine.registry().snapshot();
    let health = generation.health_counts();

    let status = if engine_state == EngineState::Stopped {
        "down"
    } else if health.unreachable > 0 {
        "degraded"
    } else {
        "ok"
    };
    let code = if status == "down" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status,
            state: engine_state,
            generation: generation.generation(),
            accounts: health.total(),
            unreachable: health.unreachable,
            cycles_completed: state.engine.stats().cycles_completed,
        }),
    )
}

/// Prometheus text exposition.
async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    match render_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if state.config.auth_enabled() && !check_basic_auth(headers, &state.config) {
        return Err(unauthorized_response());
    }
    Ok(())
}

/// Check basic authentication.
fn check_basic_auth(headers: &HeaderMap, config: &DashboardConfig) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    match base64_decode(encoded.trim()) {
        Some(decoded) => decoded == format!("{}:{}", config.username, config.password),
        None => false,
    }
}

/// Minimal standard-alphabet base64 decode for the basic auth header.
fn base64_decode(input: &str) -> Option<String> {
    fn sextet(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some(u32::from(c - b'A')),
            b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let input = input.trim_end_matches('=');
    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut buf = 0u32;
    let mut bits = 0;
    for c in input.bytes() {
        buf = (buf << 6) | sextet(c)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push(((buf >> bits) & 0xFF) as u8);
        }
    }
    String::from_utf8(out).ok()
}

/// Create an unauthorized response.
fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"DeltaMon\"")],
        "Unauthorized",
    )
        .into_response()
}

/// Serve the dashboard on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> DashboardResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(DashboardError::Serve)
}

/// Bind `config.address()` and run the dashboard until `shutdown` resolves.
pub async fn run_server<F>(engine: Arc<MonitorEngine>, config: DashboardConfig, shutdown: F) -> DashboardResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = config.address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| DashboardError::Bind {
            address: address.clone(),
            source,
        })?;
    info!(%address, auth = config.auth_enabled(), "Starting dashboard server");
    serve(listener, AppState::new(engine, config), shutdown).await
}
