//! Placement Strategy
//!
//! Chooses the node that will own a newly created shard. Placement is
//! decided once, at creation time, and recorded in the tenant directory.

use crate::domain::ports::NodeInfo;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Placement Policy
// =============================================================================

/// Policy for assigning shards to nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    /// Cycle through live nodes in name order
    #[default]
    RoundRobin,
    /// Node with the fewest recorded shards, ties broken by name
    LeastLoaded,
}

impl std::fmt::Display for PlacementPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementPolicy::RoundRobin => write!(f, "round-robin"),
            PlacementPolicy::LeastLoaded => write!(f, "least-loaded"),
        }
    }
}

impl std::str::FromStr for PlacementPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "round-robin" => Ok(PlacementPolicy::RoundRobin),
            "least-loaded" => Ok(PlacementPolicy::LeastLoaded),
            other => Err(Error::Configuration(format!(
                "unknown placement policy '{}', use 'round-robin' or 'least-loaded'",
                other
            ))),
        }
    }
}

// =============================================================================
// Placement Engine
// =============================================================================

/// Engine for selecting the owning node of a new shard
#[derive(Debug)]
pub struct PlacementEngine {
    policy: PlacementPolicy,
    cursor: AtomicU64,
}

impl PlacementEngine {
    pub fn new(policy: PlacementPolicy) -> Self {
        Self {
            policy,
            cursor: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Select a node from the live candidates
    ///
    /// `load` maps node names to the number of shards currently recorded
    /// for them; nodes missing from the map count as empty.
    pub fn select(&self, candidates: &[NodeInfo], load: &HashMap<String, usize>) -> Result<String> {
        if candidates.is_empty() {
            return Err(Error::Internal("no live nodes available for placement".into()));
        }

        let mut nodes: Vec<&str> = candidates.iter().map(|n| n.name.as_str()).collect();
        nodes.sort_unstable();
        nodes.dedup();

        let chosen = match self.policy {
            PlacementPolicy::RoundRobin => {
                let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
                nodes[(turn % nodes.len() as u64) as usize]
            }
            PlacementPolicy::LeastLoaded => nodes
                .iter()
                .copied()
                .min_by_key(|name| (load.get(*name).copied().unwrap_or(0), *name))
                .unwrap_or(nodes[0]),
        };

        Ok(chosen.to_string())
    }
}

impl Default for PlacementEngine {
    fn default() -> Self {
        Self::new(PlacementPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> Vec<NodeInfo> {
        names.iter().map(|n| NodeInfo::new(*n)).collect()
    }

    #[test]
    fn test_round_robin_cycles_in_name_order() {
        let engine = PlacementEngine::new(PlacementPolicy::RoundRobin);
        let candidates = nodes(&["node-3", "node-1", "node-2"]);
        let load = HashMap::new();

        let picks: Vec<_> = (0..4).map(|_| engine.select(&candidates, &load).unwrap()).collect();
        assert_eq!(picks, vec!["node-1", "node-2", "node-3", "node-1"]);
    }

    #[test]
    fn test_least_loaded() {
        let engine = PlacementEngine::new(PlacementPolicy::LeastLoaded);
        let candidates = nodes(&["node-1", "node-2", "node-3"]);
        let load: HashMap<String, usize> = [("node-1".to_string(), 2), ("node-2".to_string(), 1)]
            .into_iter()
            .collect();

        assert_eq!(engine.select(&candidates, &load).unwrap(), "node-3");

        let load: HashMap<String, usize> = [
            ("node-1".to_string(), 1),
            ("node-2".to_string(), 1),
            ("node-3".to_string(), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(engine.select(&candidates, &load).unwrap(), "node-1");
    }

    #[test]
    fn test_no_candidates() {
        let engine = PlacementEngine::default();
        assert!(engine.select(&[], &HashMap::new()).is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("least_loaded".parse::<PlacementPolicy>().unwrap(), PlacementPolicy::LeastLoaded);
        assert_eq!("Round-Robin".parse::<PlacementPolicy>().unwrap(), PlacementPolicy::RoundRobin);
        assert!("random".parse::<PlacementPolicy>().is_err());
        assert_eq!(PlacementPolicy::LeastLoaded.to_string(), "least-loaded");
    }
}
