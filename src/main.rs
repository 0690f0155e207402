//! QuorumKV -- one node of a quorum-replicated in-memory key-value store.
//!
//! All state is volatile: a restart starts from an empty store and relies
//! on peers for convergence.  SIGTERM/SIGINT handlers only stop accepting
//! connections and wait for in-flight requests -- no cleanup.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use quorumkv::cluster::{peer_http_client, ClusterTopology, HttpPeerLink, PeerLink};
use quorumkv::config::ConfigError;
use quorumkv::coordinator::ReplicationCoordinator;
use quorumkv::store::LocalStore;

/// Command-line arguments for the QuorumKV node.
#[derive(Parser, Debug)]
#[command(
    name = "quorumkv",
    version,
    about = "Quorum-replicated in-memory key-value store node"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "quorumkv.example.yaml")]
    config: String,

    /// This node's id (overrides `node` in the configuration file).
    #[arg(short, long)]
    node: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = quorumkv::config::load_config(&cli.config)?;

    // Initialize tracing / logging.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
    info!("Loaded configuration from {}", cli.config);

    // Resolve this node's identity and validate the cluster view.  Any
    // violation here is fatal: the process must not begin serving.
    let self_id = cli
        .node
        .or_else(|| config.node.clone())
        .ok_or(ConfigError::MissingNodeId)?;
    let topology = ClusterTopology::from_config(&config.cluster, &self_id)?;
    info!(
        node = %topology.self_id,
        n = topology.n,
        r = topology.r,
        w = topology.w,
        "cluster topology loaded"
    );

    if config.observability.metrics {
        quorumkv::metrics::init_metrics();
        quorumkv::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // One peer link per topology entry, sharing a single HTTP client
    // whose request timeout bounds calls outliving the quorum wait.
    let timeout = Duration::from_secs(config.replication.timeout_seconds);
    let client = peer_http_client(timeout)?;
    let peers: Vec<Arc<dyn PeerLink>> = topology
        .peers
        .iter()
        .map(|peer| {
            info!(peer = %peer.id, address = %peer.address, "peer link created");
            Arc::new(HttpPeerLink::new(&peer.id, &peer.address, client.clone()))
                as Arc<dyn PeerLink>
        })
        .collect();

    let store = Arc::new(LocalStore::new());
    let coordinator = Arc::new(ReplicationCoordinator::new(
        Arc::clone(&store),
        peers,
        &topology,
        timeout,
    ));

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("0.0.0.0:{}", topology.self_port));

    let state = Arc::new(quorumkv::AppState {
        config,
        store,
        coordinator,
    });

    let app = quorumkv::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("QuorumKV node {} listening on {}", self_id, bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and wait for in-flight requests to complete.  All data is lost on
    // exit; peers hold the surviving replicas.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("QuorumKV node shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
