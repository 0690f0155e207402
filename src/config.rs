//! Configuration loading and types for QuorumKV.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  The cluster section names every node in the cluster
//! (including this one) and the quorum sizes; quorum-size and address
//! validation happens when the [`crate::cluster::ClusterTopology`] is built
//! from it, before the node serves any request.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration.  All of them
/// are fatal: the process must not begin serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file is not valid YAML for [`Config`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// No node id was supplied (neither `node` in the file nor `--node`).
    #[error("no node id configured; set `node` in the config file or pass --node")]
    MissingNodeId,

    /// This node's id does not appear in the cluster node map.
    #[error("node id '{0}' not present in cluster.nodes")]
    UnknownSelfNode(String),

    /// A node address is not of the form `host:port`.
    #[error("malformed address '{address}' for node '{node}': expected host:port")]
    MalformedAddress { node: String, address: String },

    /// A node's port is not numeric.
    #[error("port of node '{node}' is not a number: '{port}'")]
    NonNumericPort { node: String, port: String },

    /// A quorum size is zero or exceeds the node count.
    #[error("invalid {kind} quorum size {size}: must be between 1 and the node count {nodes}")]
    InvalidQuorumSize {
        kind: &'static str,
        size: usize,
        nodes: usize,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// This node's identifier.  Overridable with `--node` on the CLI.
    #[serde(default)]
    pub node: Option<String>,

    /// Cluster membership and quorum sizes.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Replication tuning.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Cluster membership configuration.
///
/// `nodes` maps every node id in the cluster -- including this node -- to
/// its `host:port` address.  N is the size of this map.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// node id -> host:port for every node in the cluster.
    #[serde(default)]
    pub nodes: BTreeMap<String, String>,

    /// Read quorum R.
    #[serde(default = "default_quorum")]
    pub qread: usize,

    /// Write quorum W.
    #[serde(default = "default_quorum")]
    pub qwrite: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            qread: default_quorum(),
            qwrite: default_quorum(),
        }
    }
}

/// Replication tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Ceiling on the quorum wait, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_quorum() -> usize {
    1
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────
