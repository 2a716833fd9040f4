//! Local Shard Store
//!
//! The set of shards owned by this node process. Only code running on the
//! owning node touches these shards; other nodes reach them through the
//! internal API.

use super::partition::Shard;
use crate::domain::object::{ObjectId, StorageObject};
use crate::domain::ports::{NodeStatus, ShardSpec};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// Shard Key
// =============================================================================

/// Identity of a shard within a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey {
    pub class: String,
    pub shard: String,
}

impl ShardKey {
    pub fn new(class: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            shard: shard.into(),
        }
    }
}

impl std::fmt::Display for ShardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.class, self.shard)
    }
}

// =============================================================================
// Local Shard Store
// =============================================================================

/// All shards owned by one node
#[derive(Debug)]
pub struct LocalShardStore {
    node_name: String,
    shards: DashMap<ShardKey, Arc<Shard>>,
    created: AtomicU64,
    deleted: AtomicU64,
}

impl LocalShardStore {
    pub fn new(node_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            node_name: node_name.into(),
            shards: DashMap::new(),
            created: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        })
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Create a shard; fails `Conflict` if one with the same key exists
    pub fn create_shard(&self, spec: ShardSpec) -> Result<Arc<Shard>> {
        let key = ShardKey::new(&spec.class, &spec.shard);
        match self.shards.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::conflict("shard", key.to_string())),
            Entry::Vacant(slot) => {
                let shard = Arc::new(Shard::new(spec));
                slot.insert(shard.clone());
                self.created.fetch_add(1, Ordering::Relaxed);
                info!(node = %self.node_name, shard = %key, "Created shard");
                Ok(shard)
            }
        }
    }

    /// Look up an operational shard
    pub fn shard(&self, class: &str, shard: &str) -> Result<Arc<Shard>> {
        let key = ShardKey::new(class, shard);
        self.shards
            .get(&key)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::not_found("shard", key.to_string()))
    }

    /// Delete a shard and drop its objects
    pub fn delete_shard(&self, class: &str, shard: &str) -> Result<()> {
        let key = ShardKey::new(class, shard);
        let Some((_, removed)) = self.shards.remove(&key) else {
            return Err(Error::not_found("shard", key.to_string()));
        };

        match removed.delete() {
            Ok(dropped) => {
                self.deleted.fetch_add(1, Ordering::Relaxed);
                info!(node = %self.node_name, shard = %key, objects = dropped, "Deleted shard");
                Ok(())
            }
            Err(e) => {
                warn!(node = %self.node_name, shard = %key, error = %e, "Shard already deleted");
                Err(e)
            }
        }
    }

    pub fn put_object(&self, class: &str, shard: &str, object: StorageObject) -> Result<ObjectId> {
        self.shard(class, shard)?.put(object)
    }

    pub fn get_object(&self, class: &str, shard: &str, id: ObjectId) -> Result<StorageObject> {
        self.shard(class, shard)?.get(id)
    }

    /// Keys of every shard belonging to a class
    pub fn shards_for_class(&self, class: &str) -> Vec<ShardKey> {
        let mut keys: Vec<ShardKey> = self
            .shards
            .iter()
            .filter(|entry| entry.key().class == class)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// (created, deleted) shard counters since start
    pub fn lifecycle_counts(&self) -> (u64, u64) {
        (
            self.created.load(Ordering::Relaxed),
            self.deleted.load(Ordering::Relaxed),
        )
    }

    /// Status of every operational shard on this node
    pub fn status(&self) -> NodeStatus {
        // Snapshot the handles first so no map guard is held while counting
        let shards: Vec<Arc<Shard>> = self.shards.iter().map(|e| e.value().clone()).collect();
        let statuses = shards.iter().filter_map(|shard| shard.status().ok()).collect();
        NodeStatus::healthy(&self.node_name, statuses)
    }
}
