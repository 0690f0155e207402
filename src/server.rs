//! Axum router construction and route mapping.
//!
//! The [`app`] function wires the client-facing and peer-facing endpoints
//! to their handlers and returns a ready-to-serve [`axum::Router`].
//!
//! Client operations (`/v1/keys/*key`) go through the replication
//! coordinator.  Peer replica operations (`/internal/v1/replicas/*key`)
//! touch only the local store: they perform no coordination of their own,
//! so a replicate arriving from another node can never trigger further
//! fan-out.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::cluster::{ReplicaResponse, ReplicateRequest};
use crate::errors::{generate_request_id, KvError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Uniform response body for the client-facing operations.
///
/// Clients receive only this shape: a boolean success flag, the key, and
/// the value when a read succeeds.  A failed quorum, a missing key, and an
/// unreachable peer are indistinguishable here.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the operation reached its quorum.
    pub success: bool,
    /// The key the operation referred to.
    pub key: String,
    /// The value, present only on a successful get.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ApiResponse {
    /// Successful value-less response (put, delete).
    pub fn ok(key: &str) -> Self {
        Self {
            success: true,
            key: key.to_string(),
            value: None,
        }
    }

    /// Successful read carrying the authoritative value.
    pub fn ok_with_value(key: &str, value: String) -> Self {
        Self {
            success: true,
            key: key.to_string(),
            value: Some(value),
        }
    }

    /// Failed operation.
    pub fn failure(key: &str) -> Self {
        Self {
            success: false,
            key: key.to_string(),
            value: None,
        }
    }
}

/// Body of a client put request.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    /// The value to store.
    pub value: String,
}

/// Build the axum [`Router`] for one node.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check endpoint.
        .route("/health", get(health_check))
        // Client-facing operations (wildcard key captures slashes).
        .route(
            "/v1/keys/*key",
            get(get_key).put(put_key).delete(delete_key),
        )
        // Peer-facing replica operations.
        .route(
            "/internal/v1/replicas/*key",
            get(get_replica).put(replicate).delete(delete_replica),
        );

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `QuorumKV`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        let request_id = generate_request_id();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("QuorumKV"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Client-facing handlers ---------------------------------------------------

/// `PUT /v1/keys/*key` -- quorum-replicated write.
async fn put_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(request): Json<PutRequest>,
) -> Result<Json<ApiResponse>, KvError> {
    debug!(key, "received put request");
    state.coordinator.put(&key, &request.value).await?;
    Ok(Json(ApiResponse::ok(&key)))
}

/// `GET /v1/keys/*key` -- quorum-checked read.
async fn get_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse>, KvError> {
    debug!(key, "received get request");
    let value = state.coordinator.get(&key).await?;
    Ok(Json(ApiResponse::ok_with_value(&key, value)))
}

/// `DELETE /v1/keys/*key` -- quorum-replicated delete.
async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse>, KvError> {
    debug!(key, "received delete request");
    state.coordinator.delete(&key).await?;
    Ok(Json(ApiResponse::ok(&key)))
}

// -- Peer-facing replica handlers ---------------------------------------------

/// `PUT /internal/v1/replicas/*key` -- unconditional local write on behalf
/// of a coordinating peer, acknowledged with success.
async fn replicate(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(request): Json<ReplicateRequest>,
) -> Json<ReplicaResponse> {
    debug!(key, "received replicate request");
    state.store.put(&key, &request.value).await;
    Json(ReplicaResponse {
        success: true,
        key,
        value: None,
    })
}

/// `GET /internal/v1/replicas/*key` -- return the local copy, or
/// success=false with no value when absent.
async fn get_replica(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<ReplicaResponse> {
    debug!(key, "received get-replica request");
    let value = state.store.get(&key).await;
    Json(ReplicaResponse {
        success: value.is_some(),
        key,
        value,
    })
}

/// `DELETE /internal/v1/replicas/*key` -- unconditional local delete;
/// idempotent, absence is success.
async fn delete_replica(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<ReplicaResponse> {
    debug!(key, "received delete-replica request");
    state.store.delete(&key).await;
    Json(ReplicaResponse {
        success: true,
        key,
        value: None,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
