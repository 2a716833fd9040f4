//! Store Configuration
//!
//! Settings for one store node. Loaded from an optional YAML file and then
//! overridden by command-line flags and environment variables.

use crate::cluster::StatusFailurePolicy;
use crate::domain::ports::NodeInfo;
use crate::error::{Error, Result};
use crate::tenancy::PlacementPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Configuration for a store node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Name of this node
    pub node_name: String,
    /// REST API bind address (admin and internal routes)
    pub api_addr: String,
    /// Health server bind address
    pub health_addr: String,
    /// Metrics server bind address
    pub metrics_addr: String,
    /// Base URL peers use to reach this node
    pub advertise_url: Option<String>,
    /// Statically configured peers
    pub peers: Vec<NodeInfo>,
    /// Placement policy for new shards
    pub placement: PlacementPolicy,
    /// Bound for directory and routing calls to other nodes
    pub request_timeout_ms: u64,
    /// Bound for each node's answer to a status query
    pub status_timeout_ms: u64,
    /// Behaviour when nodes do not answer a status query
    pub status_failure_policy: StatusFailurePolicy,
    /// Peers without a heartbeat for this long are considered offline
    pub heartbeat_timeout_secs: u64,
    /// Interval between peer probes
    pub membership_refresh_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            node_name: "node-1".into(),
            api_addr: "0.0.0.0:8090".into(),
            health_addr: "0.0.0.0:8081".into(),
            metrics_addr: "0.0.0.0:8080".into(),
            advertise_url: None,
            peers: Vec::new(),
            placement: PlacementPolicy::RoundRobin,
            request_timeout_ms: 5_000,
            status_timeout_ms: 2_000,
            status_failure_policy: StatusFailurePolicy::Fail,
            heartbeat_timeout_secs: 30,
            membership_refresh_secs: 10,
        }
    }
}

impl StoreConfig {
    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    /// This node as a cluster member
    pub fn local_node(&self) -> NodeInfo {
        let node = NodeInfo::new(&self.node_name);
        match &self.advertise_url {
            Some(url) => node.with_address(url),
            None => node,
        }
    }

    /// Check the configuration before anything is started
    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(Error::Configuration("node name must not be empty".into()));
        }

        for (label, addr) in [
            ("API", &self.api_addr),
            ("health", &self.health_addr),
            ("metrics", &self.metrics_addr),
        ] {
            addr.parse::<SocketAddr>().map_err(|e| {
                Error::Configuration(format!("Invalid {} address '{}': {}", label, addr, e))
            })?;
        }

        if self.request_timeout_ms == 0 || self.status_timeout_ms == 0 {
            return Err(Error::Configuration("timeouts must be greater than zero".into()));
        }
        if self.heartbeat_timeout_secs == 0 || self.membership_refresh_secs == 0 {
            return Err(Error::Configuration(
                "heartbeat timeout and refresh interval must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.name == self.node_name {
                return Err(Error::Configuration(format!(
                    "peer list contains the local node {}",
                    peer.name
                )));
            }
            if !seen.insert(peer.name.as_str()) {
                return Err(Error::Configuration(format!("duplicate peer {}", peer.name)));
            }
            match peer.address.as_deref() {
                None | Some("") => {
                    return Err(Error::Configuration(format!("peer {} has no address", peer.name)));
                }
                Some(address) => {
                    reqwest::Url::parse(address).map_err(|e| {
                        Error::Configuration(format!("Invalid address '{}' for peer {}: {}", address, peer.name, e))
                    })?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.placement, PlacementPolicy::RoundRobin);
        assert_eq!(config.status_failure_policy, StatusFailurePolicy::Fail);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
nodeName: node-a
advertiseUrl: http://node-a:8090
placement: least-loaded
statusFailurePolicy: degrade
statusTimeoutMs: 500
peers:
  - name: node-b
    address: http://node-b:8090
"#
        )
        .unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(config.node_name, "node-a");
        assert_eq!(config.placement, PlacementPolicy::LeastLoaded);
        assert_eq!(config.status_failure_policy, StatusFailurePolicy::Degrade);
        assert_eq!(config.status_timeout(), Duration::from_millis(500));
        assert_eq!(config.api_addr, "0.0.0.0:8090");
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.local_node().address.as_deref(), Some("http://node-a:8090"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = StoreConfig {
            api_addr: "not-an-address".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        config = StoreConfig {
            peers: vec![NodeInfo::new("node-2")],
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        config = StoreConfig {
            peers: vec![NodeInfo::new("node-1").with_address("http://x:1")],
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        config = StoreConfig {
            peers: vec![NodeInfo::new("node-2").with_address("not a url")],
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        config = StoreConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_bad_yaml() {
        assert_matches!(StoreConfig::from_yaml("placement: sideways"), Err(Error::YamlParse(_)));
        assert_matches!(
            StoreConfig::load("/nonexistent/tenant-store.yaml"),
            Err(Error::Configuration(_))
        );
    }
}
