//! Quorum replication coordinator.
//!
//! Implements the client-facing put/get/delete operations: apply or read
//! the local store, fan the matching replica RPC out to every peer
//! concurrently, then count acknowledgements against the configured quorum
//! under a hard deadline.
//!
//! Each operation moves through dispatch, a bounded quorum wait, and a
//! final achieved/timed-out decision.  No retries happen at this layer; a
//! failed quorum is a definitive failure for that attempt.  Peer failures
//! are absorbed here -- they count as missing acknowledgements and never
//! escalate past the quorum decision.

use futures::stream::{FuturesUnordered, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cluster::{ClusterTopology, PeerLink, ReplicaResponse};
use crate::errors::KvError;
use crate::metrics::{KEYS_TOTAL, KV_OPERATIONS_TOTAL, REPLICA_ACKS_TOTAL};
use crate::store::LocalStore;

/// Peer calls in flight for one operation.  Spawned tasks outlive the
/// quorum wait: when the deadline fires they are left running detached and
/// their late results are dropped.
type PendingAcks = FuturesUnordered<JoinHandle<Result<ReplicaResponse, KvError>>>;

/// Drives quorum-counted replication for one node.
///
/// Holds the node's local store, one link per peer, and the quorum sizes
/// from the topology.  All fields are fixed at startup.
pub struct ReplicationCoordinator {
    store: Arc<LocalStore>,
    peers: Vec<Arc<dyn PeerLink>>,
    read_quorum: usize,
    write_quorum: usize,
    timeout: Duration,
}

impl ReplicationCoordinator {
    /// Build the coordinator from the startup topology.
    pub fn new(
        store: Arc<LocalStore>,
        peers: Vec<Arc<dyn PeerLink>>,
        topology: &ClusterTopology,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            peers,
            read_quorum: topology.r,
            write_quorum: topology.w,
            timeout,
        }
    }

    // -- Write path ----------------------------------------------------------

    /// Client-facing put.
    ///
    /// The local store is updated first and unconditionally; a failed
    /// quorum does not roll it back.  Replication to peers is always
    /// fired; with `W = 1` the client response does not wait on it.
    pub async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        debug!(key, "put dispatched");
        self.store.put(key, value).await;
        gauge!(KEYS_TOTAL).set(self.store.len().await as f64);

        let pending = self.spawn_replicate(key, value);
        self.await_write_quorum("put", key, pending).await
    }

    /// Client-facing delete.  Symmetric to [`put`](Self::put); deleting an
    /// absent key is a successful no-op on every replica.
    pub async fn delete(&self, key: &str) -> Result<(), KvError> {
        debug!(key, "delete dispatched");
        self.store.delete(key).await;
        gauge!(KEYS_TOTAL).set(self.store.len().await as f64);

        let pending = self.spawn_delete_replica(key);
        self.await_write_quorum("delete", key, pending).await
    }

    /// Shared quorum wait for put/delete.
    async fn await_write_quorum(
        &self,
        op: &'static str,
        key: &str,
        pending: PendingAcks,
    ) -> Result<(), KvError> {
        if self.write_quorum <= 1 {
            // Fast path: the local write already satisfies the quorum.
            // Replication continues in the background, best effort.
            counter!(KV_OPERATIONS_TOTAL, "op" => op, "outcome" => "quorum_reached").increment(1);
            return Ok(());
        }

        let acks = self
            .collect_acks(op, pending, self.write_quorum - 1, |response| {
                response.success
            })
            .await;
        let count = 1 + acks;

        if count >= self.write_quorum {
            debug!(key, count, "{op} reached write quorum");
            counter!(KV_OPERATIONS_TOTAL, "op" => op, "outcome" => "quorum_reached").increment(1);
            Ok(())
        } else {
            warn!(
                key,
                count,
                needed = self.write_quorum,
                "{op} failed to reach write quorum"
            );
            counter!(KV_OPERATIONS_TOTAL, "op" => op, "outcome" => "quorum_failed").increment(1);
            Err(KvError::QuorumNotReached {
                key: key.to_string(),
                needed: self.write_quorum,
                got: count,
            })
        }
    }

    // -- Read path -----------------------------------------------------------

    /// Client-facing get.
    ///
    /// A key absent from the local store fails immediately without
    /// consulting peers, even when `R > 1`.  With `R > 1` the local value
    /// is authoritative and peer replicas only count toward the quorum
    /// when byte-equal to it; the node never returns a majority value
    /// different from its own copy.
    pub async fn get(&self, key: &str) -> Result<String, KvError> {
        debug!(key, "get dispatched");
        let local = match self.store.get(key).await {
            Some(value) => value,
            None => {
                warn!(key, "get failed: key not present locally");
                counter!(KV_OPERATIONS_TOTAL, "op" => "get", "outcome" => "not_found")
                    .increment(1);
                return Err(KvError::KeyNotFound {
                    key: key.to_string(),
                });
            }
        };

        if self.read_quorum <= 1 {
            // Fast path: the local replica alone satisfies the quorum; no
            // peer interaction occurs.
            counter!(KV_OPERATIONS_TOTAL, "op" => "get", "outcome" => "quorum_reached")
                .increment(1);
            return Ok(local);
        }

        let pending = self.spawn_get_replica(key);
        let matching = self
            .collect_acks("get", pending, self.read_quorum - 1, |response| {
                response.success && response.value.as_deref() == Some(local.as_str())
            })
            .await;
        let count = 1 + matching;

        if count >= self.read_quorum {
            debug!(key, count, "get reached read quorum");
            counter!(KV_OPERATIONS_TOTAL, "op" => "get", "outcome" => "quorum_reached")
                .increment(1);
            Ok(local)
        } else {
            warn!(
                key,
                count,
                needed = self.read_quorum,
                "get failed: replicas inconsistent or unavailable"
            );
            counter!(KV_OPERATIONS_TOTAL, "op" => "get", "outcome" => "quorum_failed").increment(1);
            Err(KvError::QuorumNotReached {
                key: key.to_string(),
                needed: self.read_quorum,
                got: count,
            })
        }
    }

    // -- Fan-out and aggregation ----------------------------------------------

    /// Issue `replicate` to every peer, all concurrently.  Sequential
    /// dispatch would multiply worst-case latency by the peer count and is
    /// not an option.
    fn spawn_replicate(&self, key: &str, value: &str) -> PendingAcks {
        let pending = FuturesUnordered::new();
        for peer in &self.peers {
            let peer = Arc::clone(peer);
            let key = key.to_string();
            let value = value.to_string();
            pending.push(tokio::spawn(async move {
                peer.replicate(&key, &value).await
            }));
        }
        pending
    }

    /// Issue `get_replica` to every peer concurrently.
    fn spawn_get_replica(&self, key: &str) -> PendingAcks {
        let pending = FuturesUnordered::new();
        for peer in &self.peers {
            let peer = Arc::clone(peer);
            let key = key.to_string();
            pending.push(tokio::spawn(async move { peer.get_replica(&key).await }));
        }
        pending
    }

    /// Issue `delete_replica` to every peer concurrently.
    fn spawn_delete_replica(&self, key: &str) -> PendingAcks {
        let pending = FuturesUnordered::new();
        for peer in &self.peers {
            let peer = Arc::clone(peer);
            let key = key.to_string();
            pending.push(tokio::spawn(async move { peer.delete_replica(&key).await }));
        }
        pending
    }

    /// Drain peer results until `needed` acknowledgements matching
    /// `counts` have arrived, every peer has answered, or the deadline
    /// fires.  Errors and non-matching responses contribute nothing and
    /// never abort the wait.
    async fn collect_acks<P>(
        &self,
        op: &'static str,
        mut pending: PendingAcks,
        needed: usize,
        counts: P,
    ) -> usize
    where
        P: Fn(&ReplicaResponse) -> bool,
    {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut acks = 0usize;

        while acks < needed {
            let next = match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(joined)) => joined,
                // Every peer has answered; proceed with what arrived.
                Ok(None) => break,
                // Deadline fired.  In-flight calls keep running detached
                // and their late results are discarded.
                Err(_) => {
                    debug!(op, "quorum wait timed out");
                    break;
                }
            };

            match next {
                Ok(Ok(response)) if counts(&response) => {
                    acks += 1;
                    counter!(REPLICA_ACKS_TOTAL, "op" => op).increment(1);
                }
                Ok(Ok(response)) => {
                    debug!(op, key = %response.key, "peer response did not count toward quorum");
                }
                Ok(Err(error)) => {
                    warn!(op, %error, "peer call failed");
                }
                Err(join_error) => {
                    warn!(op, %join_error, "peer task failed");
                }
            }
        }

        acks
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type PeerFuture = Pin<Box<dyn Future<Output = Result<ReplicaResponse, KvError>> + Send>>;

    /// What a scripted peer does when called.
    enum Behavior {
        /// Acknowledge successfully; get-replica returns this value.
        Ack(Option<String>),
        /// Respond with success=false (e.g. replica missing the key).
        Nak,
        /// Fail the RPC (peer unreachable).
        Unreachable,
        /// Never respond.
        Silent,
    }

    /// In-process peer scripted per test, counting how often it is called.
    struct ScriptedPeer {
        id: String,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedPeer {
        fn new(id: &str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn respond(&self, key: &str) -> PeerFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = key.to_string();
            match &self.behavior {
                Behavior::Ack(value) => {
                    let value = value.clone();
                    Box::pin(async move {
                        Ok(ReplicaResponse {
                            success: true,
                            key,
                            value,
                        })
                    })
                }
                Behavior::Nak => Box::pin(async move {
                    Ok(ReplicaResponse {
                        success: false,
                        key,
                        value: None,
                    })
                }),
                Behavior::Unreachable => {
                    let node = self.id.clone();
                    Box::pin(async move {
                        Err(KvError::PeerUnreachable {
                            node,
                            reason: "connection refused".to_string(),
                        })
                    })
                }
                Behavior::Silent => Box::pin(std::future::pending()),
            }
        }
    }

    impl PeerLink for ScriptedPeer {
        fn node_id(&self) -> &str {
            &self.id
        }

        fn replicate(
            &self,
            key: &str,
            _value: &str,
        ) -> Pin<Box<dyn Future<Output = Result<ReplicaResponse, KvError>> + Send + '_>> {
            self.respond(key)
        }

        fn get_replica(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = Result<ReplicaResponse, KvError>> + Send + '_>> {
            self.respond(key)
        }

        fn delete_replica(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = Result<ReplicaResponse, KvError>> + Send + '_>> {
            self.respond(key)
        }
    }

    fn topology(n: usize, r: usize, w: usize) -> ClusterTopology {
        let mut nodes = BTreeMap::new();
        for i in 0..n {
            nodes.insert(format!("node-{i}"), format!("127.0.0.1:{}", 9400 + i));
        }
        let config = ClusterConfig {
            nodes,
            qread: r,
            qwrite: w,
        };
        ClusterTopology::from_config(&config, "node-0").unwrap()
    }

    fn coordinator(
        peers: Vec<Arc<ScriptedPeer>>,
        r: usize,
        w: usize,
        timeout: Duration,
    ) -> (Arc<LocalStore>, ReplicationCoordinator) {
        let n = 1 + peers.len();
        let store = Arc::new(LocalStore::new());
        let links: Vec<Arc<dyn PeerLink>> = peers
            .into_iter()
            .map(|p| p as Arc<dyn PeerLink>)
            .collect();
        let coordinator =
            ReplicationCoordinator::new(Arc::clone(&store), links, &topology(n, r, w), timeout);
        (store, coordinator)
    }

    const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_w1_put_succeeds_with_all_peers_down() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Unreachable),
            ScriptedPeer::new("charlie", Behavior::Unreachable),
        ];
        let (store, coordinator) = coordinator(peers, 1, 1, TEST_TIMEOUT);

        coordinator.put("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_w1_put_returns_without_awaiting_silent_peers() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Silent),
            ScriptedPeer::new("charlie", Behavior::Silent),
        ];
        let (_store, coordinator) = coordinator(peers, 1, 1, Duration::from_secs(20));

        // Must not block on peer availability even with a 20s ceiling.
        tokio::time::timeout(Duration::from_secs(1), coordinator.put("a", "1"))
            .await
            .expect("W=1 put must not wait on peers")
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_quorum_reached_with_one_ack_of_two_needed() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(None)),
            ScriptedPeer::new("charlie", Behavior::Unreachable),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        coordinator.put("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_put_quorum_failed_with_zero_acks_keeps_local_copy() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Unreachable),
            ScriptedPeer::new("charlie", Behavior::Unreachable),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        let result = coordinator.put("a", "1").await;
        match result {
            Err(KvError::QuorumNotReached { needed, got, .. }) => {
                assert_eq!(needed, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected QuorumNotReached, got {other:?}"),
        }
        // No rollback: the local copy stays despite the reported failure.
        assert_eq!(store.get("a").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_put_with_silent_peers_completes_at_deadline() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Silent),
            ScriptedPeer::new("charlie", Behavior::Silent),
        ];
        let (_store, coordinator) = coordinator(peers, 2, 2, Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        let result = coordinator.put("a", "1").await;
        assert!(matches!(result, Err(KvError::QuorumNotReached { .. })));
        // Bounded by the configured ceiling, not hanging.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_r1_get_reads_local_without_peer_calls() {
        let bravo = ScriptedPeer::new("bravo", Behavior::Ack(Some("different".to_string())));
        let peers = vec![Arc::clone(&bravo)];
        let (store, coordinator) = coordinator(peers, 1, 1, TEST_TIMEOUT);

        store.put("a", "local").await;
        let value = coordinator.get("a").await.unwrap();
        assert_eq!(value, "local");
        assert_eq!(bravo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_missing_local_short_circuits_even_with_valid_replicas() {
        let bravo = ScriptedPeer::new("bravo", Behavior::Ack(Some("1".to_string())));
        let charlie = ScriptedPeer::new("charlie", Behavior::Ack(Some("1".to_string())));
        let peers = vec![Arc::clone(&bravo), Arc::clone(&charlie)];
        let (_store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        let result = coordinator.get("a").await;
        assert!(matches!(result, Err(KvError::KeyNotFound { .. })));
        assert_eq!(bravo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(charlie.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_quorum_with_one_matching_replica() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(Some("1".to_string()))),
            ScriptedPeer::new("charlie", Behavior::Unreachable),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        store.put("a", "1").await;
        assert_eq!(coordinator.get("a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_get_mismatching_replica_does_not_count() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(Some("2".to_string()))),
            ScriptedPeer::new("charlie", Behavior::Unreachable),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        store.put("a", "1").await;
        let result = coordinator.get("a").await;
        match result {
            Err(KvError::QuorumNotReached { needed, got, .. }) => {
                assert_eq!(needed, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected QuorumNotReached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_never_returns_a_peer_value() {
        // Both peers agree on a different value; the local copy still wins
        // or the read fails -- it never returns the peers' value.
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(Some("2".to_string()))),
            ScriptedPeer::new("charlie", Behavior::Ack(Some("2".to_string()))),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        store.put("a", "1").await;
        assert!(matches!(
            coordinator.get("a").await,
            Err(KvError::QuorumNotReached { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_nak_replica_does_not_count() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Nak),
            ScriptedPeer::new("charlie", Behavior::Ack(Some("1".to_string()))),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        store.put("a", "1").await;
        assert_eq!(coordinator.get("a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_delete_quorum_reached() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(None)),
            ScriptedPeer::new("charlie", Behavior::Ack(None)),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        store.put("a", "1").await;
        coordinator.delete("a").await.unwrap();
        assert_eq!(store.get("a").await, None);
    }

    #[tokio::test]
    async fn test_delete_absent_key_succeeds() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(None)),
            ScriptedPeer::new("charlie", Behavior::Ack(None)),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);

        coordinator.delete("never-written").await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_wait_ends_early_when_all_peers_answer_negatively() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Unreachable),
            ScriptedPeer::new("charlie", Behavior::Unreachable),
        ];
        // Long ceiling: completion must come from peer exhaustion, not the
        // deadline.
        let (_store, coordinator) = coordinator(peers, 2, 2, Duration::from_secs(20));

        let start = tokio::time::Instant::now();
        let result = coordinator.put("a", "1").await;
        assert!(matches!(result, Err(KvError::QuorumNotReached { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_distinct_keys() {
        let peers = vec![
            ScriptedPeer::new("bravo", Behavior::Ack(None)),
            ScriptedPeer::new("charlie", Behavior::Ack(None)),
        ];
        let (store, coordinator) = coordinator(peers, 2, 2, TEST_TIMEOUT);
        let coordinator = Arc::new(coordinator);

        let mut handles = Vec::new();
        for i in 0..16 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                coordinator
                    .put(&format!("key-{i}"), &format!("value-{i}"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 16);
    }
}
