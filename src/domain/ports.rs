//! Domain Ports - Core trait definitions for the tenant store
//!
//! These traits define the boundaries between the coordinating logic
//! (directory, router, status aggregation) and the nodes that own shards.
//! A node is reached either in-process or over the network; both sides
//! implement the same port.

use super::object::{ObjectId, StorageObject};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Shard Descriptors
// =============================================================================

/// Everything a node needs to create a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardSpec {
    /// Owning class
    pub class: String,
    /// Shard name (the tenant name for multi-tenant classes)
    pub shard: String,
    /// Owning tenant, if the class is multi-tenant
    #[serde(default)]
    pub tenant: Option<String>,
    /// Property carrying the tenant value, if the class is multi-tenant
    #[serde(default)]
    pub tenant_key: Option<String>,
}

impl ShardSpec {
    /// Spec for a tenant-owned shard
    pub fn for_tenant(class: &str, tenant: &str, tenant_key: &str) -> Self {
        Self {
            class: class.to_string(),
            shard: tenant.to_string(),
            tenant: Some(tenant.to_string()),
            tenant_key: Some(tenant_key.to_string()),
        }
    }

    /// Spec for the single shard of a class without multi-tenancy
    pub fn single(class: &str, shard: &str) -> Self {
        Self {
            class: class.to_string(),
            shard: shard.to_string(),
            tenant: None,
            tenant_key: None,
        }
    }
}

/// Status of one locally owned shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardStatus {
    /// Shard name
    pub name: String,
    /// Owning class
    pub class: String,
    /// Owning tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Live object count
    pub object_count: u64,
}

// =============================================================================
// Node Status
// =============================================================================

/// Health of a node as seen by the status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeHealth {
    Healthy,
    Unavailable,
}

impl std::fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeHealth::Healthy => write!(f, "HEALTHY"),
            NodeHealth::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

/// Totals across a node's shards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub shard_count: u64,
    pub object_count: u64,
}

/// Local status reported by one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub name: String,
    pub status: NodeHealth,
    pub version: String,
    pub shards: Vec<ShardStatus>,
    pub stats: NodeStats,
}

impl NodeStatus {
    /// Build a healthy status, ordering shards and computing totals
    pub fn healthy(name: impl Into<String>, mut shards: Vec<ShardStatus>) -> Self {
        shards.sort_by(|a, b| (&a.class, &a.name).cmp(&(&b.class, &b.name)));
        let stats = NodeStats {
            shard_count: shards.len() as u64,
            object_count: shards.iter().map(|s| s.object_count).sum(),
        };
        Self {
            name: name.into(),
            status: NodeHealth::Healthy,
            version: crate::VERSION.to_string(),
            shards,
            stats,
        }
    }

    /// Keep only the shards of one class
    pub fn retain_class(&mut self, class: &str) {
        self.shards.retain(|s| s.class == class);
        self.stats = NodeStats {
            shard_count: self.shards.len() as u64,
            object_count: self.shards.iter().map(|s| s.object_count).sum(),
        };
    }
}

// =============================================================================
// Membership Port
// =============================================================================

/// A cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Node name
    pub name: String,
    /// Base URL of the node's internal API, if reachable over the network
    #[serde(default)]
    pub address: Option<String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Port for cluster membership
pub trait Membership: Send + Sync {
    /// Name of the node this process runs as
    fn local_node(&self) -> &str;

    /// Live members ordered by name
    fn live_nodes(&self) -> Vec<NodeInfo>;

    /// Every registered member, live or not, ordered by name
    fn members(&self) -> Vec<NodeInfo>;
}

// =============================================================================
// Node Client Port
// =============================================================================

/// Port for the shard operations a node offers to the rest of the cluster
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Name of the node behind this client
    fn node_name(&self) -> &str;

    /// Whether calls stay inside this process
    fn is_local(&self) -> bool;

    /// Create a shard; fails `Conflict` if it already exists
    async fn create_shard(&self, spec: ShardSpec) -> Result<()>;

    /// Delete a shard and every object in it
    async fn delete_shard(&self, class: &str, shard: &str) -> Result<()>;

    /// Insert or overwrite an object in a shard
    async fn put_object(&self, class: &str, shard: &str, object: StorageObject) -> Result<ObjectId>;

    /// Read an object from a shard
    async fn get_object(&self, class: &str, shard: &str, id: ObjectId) -> Result<StorageObject>;

    /// Report every shard this node owns
    async fn local_status(&self) -> Result<NodeStatus>;
}

pub type NodeClientRef = Arc<dyn NodeClient>;
pub type MembershipRef = Arc<dyn Membership>;
