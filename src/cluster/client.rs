//! Node Clients
//!
//! Adapters for the `NodeClient` port: one that calls the in-process shard
//! store and one that calls a peer's internal HTTP API. The pool resolves a
//! node name to the right adapter.

use crate::domain::object::{ObjectId, StorageObject};
use crate::domain::ports::{Membership, NodeClient, NodeClientRef, NodeInfo, NodeStatus, ShardSpec};
use crate::error::{Error, ErrorBody, Result};
use crate::shard::LocalShardStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// =============================================================================
// Call Options
// =============================================================================

/// Bounds for a call that crosses node boundaries
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Upper bound for the whole call
    pub timeout: Duration,
    /// Caller-held cancellation handle
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Run a single attempt of a remote call under a timeout and cancellation
///
/// Timeouts surface as `Routing` naming the node. Dropping the call never
/// leaves a shard half-written: shard mutations complete under one lock
/// acquisition on the owning node.
pub async fn bounded<T, F>(node: &str, options: &CallOptions, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = options.cancel.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(options.timeout, call) => match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::routing(
                node,
                format!("no response within {}ms", options.timeout.as_millis()),
            )),
        },
    }
}

// =============================================================================
// Local Node Client
// =============================================================================

/// Client for the shards owned by this process
#[derive(Debug, Clone)]
pub struct LocalNodeClient {
    store: Arc<LocalShardStore>,
}

impl LocalNodeClient {
    pub fn new(store: Arc<LocalShardStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub fn store(&self) -> &Arc<LocalShardStore> {
        &self.store
    }
}

#[async_trait]
impl NodeClient for LocalNodeClient {
    fn node_name(&self) -> &str {
        self.store.node_name()
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn create_shard(&self, spec: ShardSpec) -> Result<()> {
        self.store.create_shard(spec).map(|_| ())
    }

    async fn delete_shard(&self, class: &str, shard: &str) -> Result<()> {
        self.store.delete_shard(class, shard)
    }

    async fn put_object(&self, class: &str, shard: &str, object: StorageObject) -> Result<ObjectId> {
        self.store.put_object(class, shard, object)
    }

    async fn get_object(&self, class: &str, shard: &str, id: ObjectId) -> Result<StorageObject> {
        self.store.get_object(class, shard, id)
    }

    async fn local_status(&self) -> Result<NodeStatus> {
        Ok(self.store.status())
    }
}

// =============================================================================
// HTTP Node Client
// =============================================================================

/// Acknowledgement returned by internal object writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutAck {
    pub id: ObjectId,
}

/// Client for a peer node's internal API
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    name: String,
    base_url: reqwest::Url,
    http: reqwest::Client,
}

impl HttpNodeClient {
    /// Create a client for a peer at `base_url` (e.g. `http://node-2:8090`)
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Invalid HTTP client settings: {}", e)))?;

        let name = name.into();
        let base_url = base_url.into();
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Configuration(format!("Invalid address '{}' for node {}: {}", base_url, name, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Address '{}' for node {} cannot carry a path",
                base_url, name
            )));
        }

        Ok(Self {
            name,
            base_url: parsed,
            http,
        })
    }

    /// URL for a path under the peer's base URL
    ///
    /// Each segment is percent-encoded on its own, so class and tenant
    /// names may contain `/`, `?`, `#` or `%`.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::routing(&self.name, "base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn transport(&self, err: reqwest::Error) -> Error {
        Error::routing(&self.name, err)
    }

    /// Decode a response, mapping error bodies back onto `Error`
    async fn decode<T: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            return response.json::<T>().await.map_err(|e| self.transport(e));
        }
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(body.into()),
            Err(_) => Err(Error::routing(&self.name, format!("unexpected HTTP status {}", status))),
        }
    }

    async fn expect_empty(&self, response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }
        self.decode::<serde_json::Value>(response).await.map(|_| ())
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    fn node_name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn create_shard(&self, spec: ShardSpec) -> Result<()> {
        debug!(node = %self.name, class = %spec.class, shard = %spec.shard, "Requesting shard creation");
        let response = self
            .http
            .post(self.endpoint(&["internal", "shards"])?)
            .json(&spec)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.expect_empty(response).await
    }

    async fn delete_shard(&self, class: &str, shard: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.endpoint(&["internal", "shards", class, shard])?)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.expect_empty(response).await
    }

    async fn put_object(&self, class: &str, shard: &str, object: StorageObject) -> Result<ObjectId> {
        let response = self
            .http
            .put(self.endpoint(&["internal", "shards", class, shard, "objects"])?)
            .json(&object)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode::<PutAck>(response).await.map(|ack| ack.id)
    }

    async fn get_object(&self, class: &str, shard: &str, id: ObjectId) -> Result<StorageObject> {
        let id = id.to_string();
        let response = self
            .http
            .get(self.endpoint(&["internal", "shards", class, shard, "objects", id.as_str()])?)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }

    async fn local_status(&self) -> Result<NodeStatus> {
        let response = self
            .http
            .get(self.endpoint(&["internal", "status"])?)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }
}

// =============================================================================
// Client Pool
// =============================================================================

/// Resolves node names to clients
pub struct NodeClientPool {
    local: NodeClientRef,
    membership: Arc<dyn Membership>,
    remotes: DashMap<String, NodeClientRef>,
    timeout: Duration,
}

impl std::fmt::Debug for NodeClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClientPool")
            .field("local", &self.local.node_name())
            .field("remotes", &self.remotes.len())
            .finish()
    }
}

impl NodeClientPool {
    pub fn new(local: NodeClientRef, membership: Arc<dyn Membership>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            local,
            membership,
            remotes: DashMap::new(),
            timeout,
        })
    }

    /// Install a client for a node, replacing any cached one
    pub fn insert(&self, client: NodeClientRef) {
        self.remotes.insert(client.node_name().to_string(), client);
    }

    pub fn local(&self) -> NodeClientRef {
        self.local.clone()
    }

    /// Client for a node; remote HTTP clients are built on first use
    pub fn get(&self, node: &str) -> Result<NodeClientRef> {
        if node == self.local.node_name() {
            return Ok(self.local.clone());
        }
        if let Some(client) = self.remotes.get(node) {
            return Ok(client.value().clone());
        }

        let info = self
            .membership
            .live_nodes()
            .into_iter()
            .find(|n| n.name == node)
            .ok_or_else(|| Error::routing(node, "node is not a live cluster member"))?;
        self.for_member(&info)
    }

    /// Client for a known member regardless of its liveness
    ///
    /// Used by the membership probe, which must keep reaching nodes that
    /// are currently marked offline.
    pub fn for_member(&self, info: &NodeInfo) -> Result<NodeClientRef> {
        if info.name == self.local.node_name() {
            return Ok(self.local.clone());
        }
        if let Some(client) = self.remotes.get(&info.name) {
            return Ok(client.value().clone());
        }

        let address = info
            .address
            .clone()
            .ok_or_else(|| Error::routing(&info.name, "node has no advertised address"))?;
        let client: NodeClientRef = Arc::new(HttpNodeClient::new(&info.name, address, self.timeout)?);
        self.remotes.insert(info.name.clone(), client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::membership::NodeRegistry;
    use crate::domain::ports::NodeInfo;
    use assert_matches::assert_matches;

    impl std::fmt::Debug for dyn NodeClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("NodeClient").field("node", &self.node_name()).finish()
        }
    }

    fn pool(registry: Arc<NodeRegistry>) -> Arc<NodeClientPool> {
        let store = LocalShardStore::new("node-1");
        NodeClientPool::new(LocalNodeClient::new(store), registry, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_bounded_times_out_as_routing_error() {
        let options = CallOptions::new(Duration::from_millis(20));
        let result: Result<()> = bounded("node-2", &options, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_matches!(result, Err(Error::Routing { node, .. }) if node == "node-2");
    }

    #[tokio::test]
    async fn test_bounded_honours_cancellation() {
        let options = CallOptions::new(Duration::from_secs(5));
        options.cancel.cancel();
        let result: Result<()> = bounded("node-2", &options, std::future::pending()).await;
        assert_matches!(result, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_local_client_round_trip() {
        let store = LocalShardStore::new("node-1");
        let client = LocalNodeClient::new(store.clone());
        client
            .create_shard(ShardSpec::for_tenant("MultiTenantClass", "Tenant1", "tenantName"))
            .await
            .unwrap();

        let status = client.local_status().await.unwrap();
        assert_eq!(status.shards.len(), 1);
        assert!(client.is_local());
    }

    #[test]
    fn test_http_endpoint_escapes_segments() {
        let client = HttpNodeClient::new("node-2", "http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
        let url = client
            .endpoint(&["internal", "shards", "MultiTenantClass", "team/x?#%", "objects"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/internal/shards/MultiTenantClass/team%2Fx%3F%23%25/objects"
        );

        let prefixed = HttpNodeClient::new("node-2", "http://node-2:8090/store", Duration::from_secs(1)).unwrap();
        let url = prefixed.endpoint(&["internal", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://node-2:8090/store/internal/status");

        assert_matches!(
            HttpNodeClient::new("node-2", "not a url", Duration::from_secs(1)),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_pool_resolves_local_and_remote() {
        let registry = NodeRegistry::new(NodeInfo::new("node-1"));
        registry
            .register(NodeInfo::new("node-2").with_address("http://127.0.0.1:9"))
            .unwrap();
        registry.register(NodeInfo::new("node-3")).unwrap();
        let pool = pool(registry);

        assert!(pool.get("node-1").unwrap().is_local());
        let remote = pool.get("node-2").unwrap();
        assert!(!remote.is_local());
        assert_eq!(remote.node_name(), "node-2");

        assert_matches!(pool.get("node-3"), Err(Error::Routing { .. }));
        assert_matches!(pool.get("node-9"), Err(Error::Routing { .. }));
    }
}
