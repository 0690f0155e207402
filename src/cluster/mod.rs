//! Cluster membership and peer communication.

pub mod peer;
pub mod topology;

pub use peer::{peer_http_client, HttpPeerLink, PeerLink, ReplicaResponse, ReplicateRequest};
pub use topology::{ClusterTopology, NodeDescriptor};
