//! The inbound webhook receiver (§4.H, §6). Runs on its own listener,
//! separate from application traffic and the admin surface.

use crate::cache::Storage;
use crate::refresh::RefreshOrchestrator;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router as AxumRouter};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-flagcache-signature";

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub flag_keys: Vec<String>,
    #[allow(dead_code)]
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: &'static str,
}

pub struct WebhookState {
    pub storage: Arc<Storage>,
    pub refresh: Arc<RefreshOrchestrator>,
    pub secret: Option<String>,
}

pub fn router(state: Arc<WebhookState>) -> AxumRouter {
    AxumRouter::new()
        .route("/webhook", post(handle_webhook))
        .with_state(state)
}

/// Constant-time HMAC-SHA256 verification over the raw body (§9 design
/// note): `Mac::verify_slice` is itself constant-time, so no hand-rolled
/// comparison is needed.
fn verify_signature(secret: &str, body: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.secret {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        let Some(provided) = provided else {
            warn!("webhook request missing signature header while secret is configured");
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse { status: "unauthorized" }),
            );
        };
        if !verify_signature(secret, &body, provided) {
            warn!("webhook signature mismatch");
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse { status: "unauthorized" }),
            );
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "malformed webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse { status: "bad_request" }),
            );
        }
    };

    crate::metrics::webhook_event(&payload.event);
    debug!(event = %payload.event, flag_keys = ?payload.flag_keys, "webhook accepted");

    match payload.event.as_str() {
        "flag.deleted" => {
            for key in &payload.flag_keys {
                state.storage.delete(key);
            }
            let refresh = state.refresh.clone();
            tokio::spawn(async move {
                refresh.snapshot_disk().await;
            });
        }
        "flag.updated" => {
            for key in &payload.flag_keys {
                state.storage.delete(key);
            }
            let refresh = state.refresh.clone();
            tokio::spawn(async move {
                refresh.tick(&CancellationToken::new()).await;
            });
        }
        other => {
            warn!(event = %other, "unrecognized webhook event, ignoring");
        }
    }

    (StatusCode::OK, Json(WebhookResponse { status: "ok" }))
}
