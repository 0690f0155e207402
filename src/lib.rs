//! QuorumKV library -- Dynamo-style quorum-replicated key-value store.
//!
//! This crate provides the components for running one node of a
//! fixed-membership cluster in which every node replicates the full
//! keyspace: the in-memory local store, cluster topology, peer links, the
//! quorum replication coordinator, and the HTTP surface that carries both
//! client and inter-node operations.

use std::sync::Arc;

pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod metrics;
pub mod server;
pub mod store;

use crate::config::Config;
use crate::coordinator::ReplicationCoordinator;
use crate::store::LocalStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Node configuration.
    pub config: Config,
    /// This node's local replica, reachable directly by the peer-facing
    /// replica handlers.
    pub store: Arc<LocalStore>,
    /// Quorum replication coordinator backing the client-facing handlers.
    pub coordinator: Arc<ReplicationCoordinator>,
}
