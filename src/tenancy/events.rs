//! Directory Events
//!
//! Events emitted by the tenant directory for observers that react to
//! shard lifecycle changes.

use serde::{Deserialize, Serialize};

/// Events emitted by the tenant directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantEvent {
    /// A node was chosen for a new shard
    ShardPlaced {
        class: String,
        shard: String,
        node: String,
    },

    /// The owning node confirmed the tenant's shard
    TenantCreated {
        class: String,
        tenant: String,
        node: String,
    },

    /// The tenant's shard was deleted and its entry removed
    TenantDeleted {
        class: String,
        tenant: String,
        node: String,
    },

    /// Shard deletion failed; the tenant stays in the deleting state
    TenantDeletionFailed {
        class: String,
        tenant: String,
        node: String,
        reason: String,
    },
}

impl TenantEvent {
    pub fn class(&self) -> &str {
        match self {
            TenantEvent::ShardPlaced { class, .. }
            | TenantEvent::TenantCreated { class, .. }
            | TenantEvent::TenantDeleted { class, .. }
            | TenantEvent::TenantDeletionFailed { class, .. } => class,
        }
    }

    pub fn node(&self) -> &str {
        match self {
            TenantEvent::ShardPlaced { node, .. }
            | TenantEvent::TenantCreated { node, .. }
            | TenantEvent::TenantDeleted { node, .. }
            | TenantEvent::TenantDeletionFailed { node, .. } => node,
        }
    }
}

impl std::fmt::Display for TenantEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantEvent::ShardPlaced { class, shard, node } => {
                write!(f, "shard {}/{} placed on {}", class, shard, node)
            }
            TenantEvent::TenantCreated { class, tenant, node } => {
                write!(f, "tenant {}/{} created on {}", class, tenant, node)
            }
            TenantEvent::TenantDeleted { class, tenant, node } => {
                write!(f, "tenant {}/{} deleted from {}", class, tenant, node)
            }
            TenantEvent::TenantDeletionFailed {
                class,
                tenant,
                node,
                reason,
            } => write!(f, "deleting tenant {}/{} on {} failed: {}", class, tenant, node, reason),
        }
    }
}
