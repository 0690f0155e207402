//! Cluster membership and quorum configuration.
//!
//! A [`ClusterTopology`] is built once at startup from the cluster section
//! of the configuration file and is read-only thereafter -- there is no
//! dynamic membership.  Quorum-size and address invariants are enforced
//! here, so a violated configuration is fatal before the node serves any
//! request, never at request time.

use crate::config::{ClusterConfig, ConfigError};

/// Identity and address of one node in the cluster.  Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Unique node identifier.
    pub id: String,
    /// `host:port` address the node listens on.
    pub address: String,
}

/// The full cluster view from this node's perspective.
///
/// Invariants, checked by [`ClusterTopology::from_config`]:
/// `n = 1 + peers.len()`, `1 <= r <= n`, `1 <= w <= n`, every port numeric.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    /// This node's identifier.
    pub self_id: String,
    /// The port this node listens on, taken from its own entry in the
    /// node map.
    pub self_port: u16,
    /// Every other node in the cluster.
    pub peers: Vec<NodeDescriptor>,
    /// Total replica count N (self + peers).
    pub n: usize,
    /// Read quorum R.
    pub r: usize,
    /// Write quorum W.
    pub w: usize,
}

impl ClusterTopology {
    /// Build and validate the topology for the node named `self_id`.
    pub fn from_config(cluster: &ClusterConfig, self_id: &str) -> Result<Self, ConfigError> {
        let self_address = cluster
            .nodes
            .get(self_id)
            .ok_or_else(|| ConfigError::UnknownSelfNode(self_id.to_string()))?;

        let mut peers = Vec::new();
        for (id, address) in &cluster.nodes {
            parse_port(id, address)?;
            if id != self_id {
                peers.push(NodeDescriptor {
                    id: id.clone(),
                    address: address.clone(),
                });
            }
        }

        let n = cluster.nodes.len();
        if cluster.qread == 0 || cluster.qread > n {
            return Err(ConfigError::InvalidQuorumSize {
                kind: "read",
                size: cluster.qread,
                nodes: n,
            });
        }
        if cluster.qwrite == 0 || cluster.qwrite > n {
            return Err(ConfigError::InvalidQuorumSize {
                kind: "write",
                size: cluster.qwrite,
                nodes: n,
            });
        }

        Ok(Self {
            self_id: self_id.to_string(),
            self_port: parse_port(self_id, self_address)?,
            peers,
            n,
            r: cluster.qread,
            w: cluster.qwrite,
        })
    }
}

/// Split `host:port` and parse the port, mapping failures to the fatal
/// configuration errors the loader reports.
fn parse_port(node: &str, address: &str) -> Result<u16, ConfigError> {
    let (_, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::MalformedAddress {
            node: node.to_string(),
            address: address.to_string(),
        })?;
    port.parse::<u16>()
        .map_err(|_| ConfigError::NonNumericPort {
            node: node.to_string(),
            port: port.to_string(),
        })
}

// ── Tests ───────────────────────────────────────────────────────────
