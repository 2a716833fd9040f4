//! Node Registry
//!
//! Tracks the members of the cluster and their liveness. The registry is
//! the injected membership source for placement and status aggregation;
//! tests swap in a fixed member list through the same trait.

use super::client::{bounded, CallOptions};
use crate::domain::ports::{Membership, NodeClientRef, NodeInfo};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// Membership Events
// =============================================================================

/// Events emitted by the node registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    /// A node joined the cluster
    NodeRegistered { node: String },
    /// A node left the cluster
    NodeDeregistered { node: String },
    /// A node missed its heartbeats
    NodeWentOffline { node: String },
    /// An offline node sent a heartbeat again
    NodeCameOnline { node: String },
}

impl MembershipEvent {
    pub fn node(&self) -> &str {
        match self {
            MembershipEvent::NodeRegistered { node }
            | MembershipEvent::NodeDeregistered { node }
            | MembershipEvent::NodeWentOffline { node }
            | MembershipEvent::NodeCameOnline { node } => node,
        }
    }
}

// =============================================================================
// Node Entry
// =============================================================================

/// Entry for a single node in the registry
#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub info: NodeInfo,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub online: bool,
}

impl NodeEntry {
    fn new(info: NodeInfo) -> Self {
        let now = Utc::now();
        Self {
            info,
            registered_at: now,
            last_heartbeat: now,
            online: true,
        }
    }
}

/// Snapshot of registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipStats {
    pub total_nodes: u64,
    pub online_nodes: u64,
    pub registrations: u64,
    pub deregistrations: u64,
}

// =============================================================================
// Node Registry
// =============================================================================

/// Cluster membership with heartbeat-based liveness
pub struct NodeRegistry {
    local: String,
    nodes: RwLock<BTreeMap<String, NodeEntry>>,
    registrations: AtomicU64,
    deregistrations: AtomicU64,
    event_sender: broadcast::Sender<MembershipEvent>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("local", &self.local)
            .field("nodes", &self.nodes.read().len())
            .finish()
    }
}

impl NodeRegistry {
    /// Create a registry containing only the local node
    pub fn new(local: NodeInfo) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(256);
        let name = local.name.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(name.clone(), NodeEntry::new(local));

        Arc::new(Self {
            local: name,
            nodes: RwLock::new(nodes),
            registrations: AtomicU64::new(1),
            deregistrations: AtomicU64::new(0),
            event_sender,
        })
    }

    /// Create a registry with the local node and a fixed set of peers
    pub fn with_peers(local: NodeInfo, peers: impl IntoIterator<Item = NodeInfo>) -> Result<Arc<Self>> {
        let registry = Self::new(local);
        for peer in peers {
            registry.register(peer)?;
        }
        Ok(registry)
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.event_sender.subscribe()
    }

    /// Register a new node
    pub fn register(&self, info: NodeInfo) -> Result<()> {
        let name = info.name.clone();
        {
            let mut nodes = self.nodes.write();
            if nodes.contains_key(&name) {
                return Err(Error::conflict("node", &name));
            }
            nodes.insert(name.clone(), NodeEntry::new(info));
        }
        self.registrations.fetch_add(1, Ordering::Relaxed);

        info!(node = %name, "Node registered");
        let _ = self.event_sender.send(MembershipEvent::NodeRegistered { node: name });
        Ok(())
    }

    /// Deregister a node
    pub fn deregister(&self, name: &str) -> Result<()> {
        if name == self.local {
            return Err(Error::Configuration(format!(
                "cannot deregister the local node {}",
                name
            )));
        }
        if self.nodes.write().remove(name).is_none() {
            return Err(Error::not_found("node", name));
        }
        self.deregistrations.fetch_add(1, Ordering::Relaxed);

        info!(node = %name, "Node deregistered");
        let _ = self.event_sender.send(MembershipEvent::NodeDeregistered {
            node: name.to_string(),
        });
        Ok(())
    }

    /// Record a heartbeat from a node
    pub fn heartbeat(&self, name: &str) -> Result<()> {
        let came_online = {
            let mut nodes = self.nodes.write();
            let entry = nodes.get_mut(name).ok_or_else(|| Error::not_found("node", name))?;
            entry.last_heartbeat = Utc::now();
            let was_offline = !entry.online;
            entry.online = true;
            was_offline
        };

        if came_online {
            info!(node = %name, "Node came back online");
            let _ = self.event_sender.send(MembershipEvent::NodeCameOnline {
                node: name.to_string(),
            });
        }
        Ok(())
    }

    /// Mark nodes without a recent heartbeat as offline
    ///
    /// The local node is never marked offline. Returns the number of nodes
    /// that changed state.
    pub fn mark_stale_offline(&self, max_heartbeat_age_secs: u64) -> usize {
        let now = Utc::now();
        let max_age = chrono::Duration::seconds(max_heartbeat_age_secs as i64);
        let mut went_offline = Vec::new();
        {
            let mut nodes = self.nodes.write();
            for (name, entry) in nodes.iter_mut() {
                if name == &self.local || !entry.online {
                    continue;
                }
                let age = now.signed_duration_since(entry.last_heartbeat);
                if age > max_age {
                    entry.online = false;
                    went_offline.push(name.clone());
                }
            }
        }

        for node in &went_offline {
            warn!(node = %node, "Node missed heartbeats, marking offline");
            let _ = self.event_sender.send(MembershipEvent::NodeWentOffline { node: node.clone() });
        }
        went_offline.len()
    }

    /// Get a node by name
    pub fn get(&self, name: &str) -> Option<NodeEntry> {
        self.nodes.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().contains_key(name)
    }

    /// All registered nodes, online or not, ordered by name
    pub fn all_nodes(&self) -> Vec<NodeEntry> {
        self.nodes.read().values().cloned().collect()
    }

    /// Probe peers once and refresh liveness
    ///
    /// Peers that answer a status query get a heartbeat; afterwards every
    /// peer silent for longer than `max_heartbeat_age_secs` is marked
    /// offline. Returns the number of peers that went offline.
    pub async fn probe(&self, peers: &[NodeClientRef], options: &CallOptions, max_heartbeat_age_secs: u64) -> usize {
        let answers = join_all(peers.iter().map(|peer| async move {
            let result = bounded(peer.node_name(), options, peer.local_status()).await;
            (peer.node_name(), result)
        }))
        .await;

        for (name, result) in answers {
            match result {
                Ok(_) => {
                    if let Err(e) = self.heartbeat(name) {
                        debug!(node = %name, error = %e, "Heartbeat from unknown node ignored");
                    }
                }
                Err(e) => debug!(node = %name, error = %e, "Peer did not answer probe"),
            }
        }

        self.mark_stale_offline(max_heartbeat_age_secs)
    }

    pub fn stats(&self) -> MembershipStats {
        let nodes = self.nodes.read();
        MembershipStats {
            total_nodes: nodes.len() as u64,
            online_nodes: nodes.values().filter(|n| n.online).count() as u64,
            registrations: self.registrations.load(Ordering::Relaxed),
            deregistrations: self.deregistrations.load(Ordering::Relaxed),
        }
    }
}

impl Membership for NodeRegistry {
    fn local_node(&self) -> &str {
        &self.local
    }

    fn live_nodes(&self) -> Vec<NodeInfo> {
        self.nodes
            .read()
            .values()
            .filter(|entry| entry.online)
            .map(|entry| entry.info.clone())
            .collect()
    }

    fn members(&self) -> Vec<NodeInfo> {
        self.nodes.read().values().map(|entry| entry.info.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_local_node_is_live() {
        let registry = NodeRegistry::new(NodeInfo::new("node-1"));
        assert_eq!(registry.local_node(), "node-1");
        assert_eq!(registry.live_nodes(), vec![NodeInfo::new("node-1")]);
    }

    #[test]
    fn test_register_and_order() {
        let registry = NodeRegistry::with_peers(
            NodeInfo::new("node-2"),
            vec![NodeInfo::new("node-3"), NodeInfo::new("node-1")],
        )
        .unwrap();

        let names: Vec<_> = registry.live_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["node-1", "node-2", "node-3"]);
        assert_eq!(registry.stats().registrations, 3);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = NodeRegistry::new(NodeInfo::new("node-1"));
        assert_matches!(registry.register(NodeInfo::new("node-1")), Err(Error::Conflict { .. }));
    }

    #[test]
    fn test_deregister() {
        let registry = NodeRegistry::new(NodeInfo::new("node-1"));
        registry.register(NodeInfo::new("node-2")).unwrap();
        registry.deregister("node-2").unwrap();

        assert!(!registry.contains("node-2"));
        assert_matches!(registry.deregister("node-2"), Err(Error::NotFound { .. }));
        assert_matches!(registry.deregister("node-1"), Err(Error::Configuration(_)));
        assert_eq!(registry.stats().deregistrations, 1);
    }

    #[test]
    fn test_stale_nodes_go_offline_and_recover() {
        let registry = NodeRegistry::new(NodeInfo::new("node-1"));
        registry.register(NodeInfo::new("node-2")).unwrap();
        let mut events = registry.subscribe();

        {
            let mut nodes = registry.nodes.write();
            for entry in nodes.values_mut() {
                entry.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
            }
        }

        assert_eq!(registry.mark_stale_offline(30), 1);
        let names: Vec<_> = registry.live_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["node-1"]);
        assert_eq!(
            events.try_recv().unwrap(),
            MembershipEvent::NodeWentOffline { node: "node-2".into() }
        );

        registry.heartbeat("node-2").unwrap();
        assert_eq!(registry.live_nodes().len(), 2);
        assert_eq!(events.try_recv().unwrap().node(), "node-2");
    }

    #[tokio::test]
    async fn test_refresh_marks_answering_peers() {
        use crate::cluster::client::LocalNodeClient;
        use crate::shard::LocalShardStore;
        use std::time::Duration;

        let registry = NodeRegistry::with_peers(
            NodeInfo::new("node-1"),
            vec![NodeInfo::new("node-2"), NodeInfo::new("node-3")],
        )
        .unwrap();
        {
            let mut nodes = registry.nodes.write();
            for entry in nodes.values_mut() {
                entry.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
            }
        }

        let peer: NodeClientRef = LocalNodeClient::new(LocalShardStore::new("node-2"));
        let peers = vec![peer];
        let went_offline = registry
            .probe(&peers, &CallOptions::new(Duration::from_secs(1)), 30)
            .await;

        assert_eq!(went_offline, 1);
        let names: Vec<_> = registry.live_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["node-1", "node-2"]);
    }
}
