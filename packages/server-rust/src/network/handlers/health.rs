//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::network::HealthState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub state: &'static str,
    pub in_flight: u64,
    pub uptime_secs: u64,
    pub version: &'static str,
}

/// Always 200; `state` says whether queries are being served.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        state: state.shutdown.health_state().as_str(),
        in_flight: state.shutdown.in_flight_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 200 for as long as the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 with the state name once ready; 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let health = state.shutdown.health_state();
    let status = if health == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, health.as_str())
}
