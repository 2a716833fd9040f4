//! Cluster Status Aggregation
//!
//! Fans a local-status query out to every registered node in parallel,
//! including nodes the heartbeat probe marked offline, and merges the
//! answers into one report ordered by node name. A node that does not
//! answer in time is never silently dropped: depending on the configured
//! policy the whole call fails, or the report is flagged as degraded and
//! names the missing nodes.

use super::client::{bounded, CallOptions, NodeClientPool};
use crate::domain::ports::{Membership, NodeStatus};
use crate::error::{Error, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// Failure Policy
// =============================================================================

/// What to do when some nodes do not answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFailurePolicy {
    /// Fail the whole call with `PartialClusterFailure`
    #[default]
    Fail,
    /// Report responsive nodes and flag the report as degraded
    Degrade,
}

impl std::str::FromStr for StatusFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(StatusFailurePolicy::Fail),
            "degrade" => Ok(StatusFailurePolicy::Degrade),
            other => Err(Error::Configuration(format!(
                "unknown status failure policy '{}', use 'fail' or 'degrade'",
                other
            ))),
        }
    }
}

// =============================================================================
// Cluster Status Report
// =============================================================================

/// Merged status of every registered node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Responsive nodes ordered by name
    pub nodes: Vec<NodeStatus>,
    /// Set when unresponsive nodes were left out
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreachable_nodes: Vec<String>,
}

impl ClusterStatus {
    pub fn node(&self, name: &str) -> Option<&NodeStatus> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn total_shards(&self) -> u64 {
        self.nodes.iter().map(|n| n.stats.shard_count).sum()
    }

    pub fn total_objects(&self) -> u64 {
        self.nodes.iter().map(|n| n.stats.object_count).sum()
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Builds cluster status reports from per-node answers
pub struct ClusterStatusAggregator {
    membership: Arc<dyn Membership>,
    clients: Arc<NodeClientPool>,
    timeout: Duration,
    policy: StatusFailurePolicy,
}

impl ClusterStatusAggregator {
    pub fn new(
        membership: Arc<dyn Membership>,
        clients: Arc<NodeClientPool>,
        timeout: Duration,
        policy: StatusFailurePolicy,
    ) -> Self {
        Self {
            membership,
            clients,
            timeout,
            policy,
        }
    }

    pub fn policy(&self) -> StatusFailurePolicy {
        self.policy
    }

    /// Query every member and merge the results
    ///
    /// Members marked offline are queried too: a node that owns shards
    /// never drops silently out of the report.
    pub async fn get_status(&self, class: Option<&str>) -> Result<ClusterStatus> {
        self.get_status_with(class, CallOptions::new(self.timeout)).await
    }

    /// Like `get_status`, with caller-supplied bounds
    pub async fn get_status_with(&self, class: Option<&str>, options: CallOptions) -> Result<ClusterStatus> {
        let members = self.membership.members();
        debug!(nodes = members.len(), "Collecting cluster status");

        let queries = members.iter().map(|member| {
            let options = options.clone();
            async move {
                let result = match self.clients.for_member(member) {
                    Ok(client) => bounded(&member.name, &options, client.local_status()).await,
                    Err(e) => Err(e),
                };
                (member.name.clone(), result)
            }
        });

        let mut nodes = Vec::with_capacity(members.len());
        let mut unreachable = Vec::new();
        for (name, result) in join_all(queries).await {
            match result {
                Ok(mut status) => {
                    if let Some(class) = class {
                        status.retain_class(class);
                    }
                    nodes.push(status);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(node = %name, error = %e, "Node did not report status");
                    unreachable.push(name);
                }
            }
        }

        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        unreachable.sort();

        if unreachable.is_empty() {
            return Ok(ClusterStatus {
                nodes,
                degraded: false,
                unreachable_nodes: Vec::new(),
            });
        }

        match self.policy {
            StatusFailurePolicy::Fail => Err(Error::PartialClusterFailure { nodes: unreachable }),
            StatusFailurePolicy::Degrade => Ok(ClusterStatus {
                nodes,
                degraded: true,
                unreachable_nodes: unreachable,
            }),
        }
    }
}
