//! The admin surface (§4.H, §6): operational endpoints on a listen address
//! separate from application and webhook traffic. Authentication is out of
//! scope (§6).

use crate::breaker::CircuitBreaker;
use crate::cache::Storage;
use crate::refresh::RefreshOrchestrator;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

pub struct AdminState {
    pub storage: Arc<Storage>,
    pub breaker: Arc<CircuitBreaker>,
    pub refresh: Arc<RefreshOrchestrator>,
}

pub fn router(state: Arc<AdminState>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health))
        .route("/admin/stats", get(stats))
        .route("/admin/invalidate", post(invalidate))
        .route("/admin/invalidate-all", post(invalidate_all))
        .route("/admin/refresh", post(refresh))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    circuit_open: bool,
    last_refresh: Option<u64>,
}

async fn health(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let circuit_open = state.breaker.state() == crate::breaker::State::Open;
    let last_refresh = state.breaker.last_refresh().map(|instant| {
        let elapsed = instant.elapsed();
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_sub(elapsed)
            .as_secs()
    });
    Json(HealthBody {
        status: if circuit_open { "degraded" } else { "ok" },
        circuit_open,
        last_refresh,
    })
}

async fn stats(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.storage.stats())
}

#[derive(Deserialize)]
struct InvalidateBody {
    flag_keys: Vec<String>,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

async fn invalidate(
    State(state): State<Arc<AdminState>>,
    Json(body): Json<InvalidateBody>,
) -> impl IntoResponse {
    for key in &body.flag_keys {
        state.storage.delete(key);
    }
    (StatusCode::OK, Json(StatusBody { status: "ok" }))
}

async fn invalidate_all(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    state.storage.clear();
    (StatusCode::OK, Json(StatusBody { status: "ok" }))
}

async fn refresh(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    state.refresh.tick(&CancellationToken::new()).await;
    (StatusCode::OK, Json(StatusBody { status: "ok" }))
}
