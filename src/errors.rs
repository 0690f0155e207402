//! Operation-level error types.
//!
//! Peer-level failures are absorbed inside the replication coordinator and
//! surface to clients only as a quorum-count decision.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can return
//! `Err(KvError::...)` directly: quorum failure and key-not-found become a
//! uniform `success=false` response, while an internal fault becomes an
//! HTTP 500 distinct from any normal failed-quorum response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::server::ApiResponse;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors produced by the store and the replication coordinator.
#[derive(Debug, Error)]
pub enum KvError {
    /// Too few acknowledgements (or byte-equal values) arrived before the
    /// timeout window closed.
    #[error("quorum not reached for key '{key}': needed {needed}, got {got}")]
    QuorumNotReached {
        key: String,
        needed: usize,
        got: usize,
    },

    /// The key is absent from this node's local store.
    #[error("key not found: '{key}'")]
    KeyNotFound { key: String },

    /// A single peer RPC failed or the peer was unreachable.  Never
    /// escalates past the coordinator; recorded here so peer links have a
    /// typed failure to return.
    #[error("peer '{node}' unreachable: {reason}")]
    PeerUnreachable { node: String, reason: String },

    /// Catch-all for unexpected internal faults.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl KvError {
    /// The key this error pertains to, where one is known.
    fn key(&self) -> &str {
        match self {
            KvError::QuorumNotReached { key, .. } => key,
            KvError::KeyNotFound { key } => key,
            KvError::PeerUnreachable { .. } | KvError::Internal(_) => "",
        }
    }
}

impl IntoResponse for KvError {
    fn into_response(self) -> Response {
        match self {
            // Clients receive a uniform boolean success flag; they cannot
            // distinguish a missing key from a failed quorum.
            KvError::QuorumNotReached { .. } | KvError::KeyNotFound { .. } => {
                (StatusCode::OK, Json(ApiResponse::failure(self.key()))).into_response()
            }
            // A lone peer failure reaching a handler is a coordinator bug;
            // treat it like an internal fault.
            KvError::PeerUnreachable { .. } | KvError::Internal(_) => {
                tracing::error!(error = %self, "internal fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::failure("")),
                )
                    .into_response()
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
