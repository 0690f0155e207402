//! Peer RPC links.
//!
//! A [`PeerLink`] is a handle to one peer node, created once at startup
//! from the topology.  It issues the three inter-node RPCs (replicate,
//! get-replica, delete-replica); the acknowledgement is carried back as
//! the RPC response.  The trait works in terms of boxed futures so the
//! coordinator can hold `Arc<dyn PeerLink>` handles, and so tests can
//! substitute in-process fakes for the HTTP implementation.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::KvError;

/// Percent-encoding set for keys placed into a replica URL path: encode
/// everything except unreserved characters and '/'.  Keys are opaque
/// strings and may carry URL-reserved characters; the receiving wildcard
/// route decodes them back.
const KEY_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Build the HTTP client shared by all peer links.  The request timeout
/// sits above the quorum ceiling so calls detached by an expired quorum
/// wait still terminate instead of pending forever on a hung peer.
pub fn peer_http_client(quorum_ceiling: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(quorum_ceiling + Duration::from_secs(1))
        .build()
}

/// The result of one peer RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaResponse {
    /// Whether the peer applied (or could answer) the operation.
    pub success: bool,
    /// The key the operation referred to.
    pub key: String,
    /// The peer's stored value, present only for successful get-replica.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Body of a replicate request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateRequest {
    /// The value to store under the addressed key.
    pub value: String,
}

type PeerFuture<'a> = Pin<Box<dyn Future<Output = Result<ReplicaResponse, KvError>> + Send + 'a>>;

/// Async contract for talking to one peer.
pub trait PeerLink: Send + Sync + 'static {
    /// The peer's node id, for logging.
    fn node_id(&self) -> &str;

    /// Ask the peer to write `value` under `key` in its local store.
    fn replicate(&self, key: &str, value: &str) -> PeerFuture<'_>;

    /// Ask the peer for its local copy of `key`.
    fn get_replica(&self, key: &str) -> PeerFuture<'_>;

    /// Ask the peer to delete `key` from its local store.
    fn delete_replica(&self, key: &str) -> PeerFuture<'_>;
}

/// [`PeerLink`] over the peer's internal HTTP surface.
///
/// One reqwest client is shared across all links; connection pooling is
/// the client's concern.
pub struct HttpPeerLink {
    node_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpPeerLink {
    /// Create a link to the peer at `address` (`host:port`).
    pub fn new(node_id: &str, address: &str, client: reqwest::Client) -> Self {
        Self {
            node_id: node_id.to_string(),
            base_url: format!("http://{address}/internal/v1/replicas"),
            client,
        }
    }

    fn replica_url(&self, key: &str) -> String {
        let encoded = percent_encoding::utf8_percent_encode(key, &KEY_ENCODE_SET);
        format!("{}/{}", self.base_url, encoded)
    }

    fn unreachable(&self, error: reqwest::Error) -> KvError {
        KvError::PeerUnreachable {
            node: self.node_id.clone(),
            reason: error.to_string(),
        }
    }

    async fn decode(&self, response: reqwest::Response) -> Result<ReplicaResponse, KvError> {
        // A non-2xx status is an RPC-level fault on the peer, not a normal
        // success=false response.
        let status = response.status();
        if !status.is_success() {
            return Err(KvError::PeerUnreachable {
                node: self.node_id.clone(),
                reason: format!("peer returned status {status}"),
            });
        }
        response
            .json::<ReplicaResponse>()
            .await
            .map_err(|error| self.unreachable(error))
    }
}

impl PeerLink for HttpPeerLink {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn replicate(&self, key: &str, value: &str) -> PeerFuture<'_> {
        let url = self.replica_url(key);
        let body = ReplicateRequest {
            value: value.to_string(),
        };
        Box::pin(async move {
            let response = self
                .client
                .put(url)
                .json(&body)
                .send()
                .await
                .map_err(|error| self.unreachable(error))?;
            self.decode(response).await
        })
    }

    fn get_replica(&self, key: &str) -> PeerFuture<'_> {
        let url = self.replica_url(key);
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|error| self.unreachable(error))?;
            self.decode(response).await
        })
    }

    fn delete_replica(&self, key: &str) -> PeerFuture<'_> {
        let url = self.replica_url(key);
        Box::pin(async move {
            let response = self
                .client
                .delete(url)
                .send()
                .await
                .map_err(|error| self.unreachable(error))?;
            self.decode(response).await
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
