//! Store Coordinator
//!
//! Wires the schema registry, tenant directory, router and status
//! aggregator of one node together and exposes the administrative
//! operations the API serves:
//! - Class lifecycle (with default shards for classes without tenancy)
//! - Tenant lifecycle
//! - Object writes and reads
//! - Cluster status

use crate::cluster::{
    CallOptions, ClusterStatus, ClusterStatusAggregator, LocalNodeClient, NodeClientPool, NodeRegistry,
};
use crate::config::StoreConfig;
use crate::domain::object::{NewObject, ObjectId, StorageObject};
use crate::domain::ports::{Membership, NodeClientRef};
use crate::error::{Error, Result};
use crate::metrics::StoreMetrics;
use crate::router::Router;
use crate::schema::{Class, SchemaRegistry};
use crate::shard::LocalShardStore;
use crate::tenancy::{TenantDirectory, TenantEntry, TenantOutcome};
use std::sync::Arc;
use tracing::{info, warn};

/// One node's view of the store
pub struct Coordinator {
    config: StoreConfig,
    schema: Arc<SchemaRegistry>,
    directory: Arc<TenantDirectory>,
    router: Router,
    status: ClusterStatusAggregator,
    store: Arc<LocalShardStore>,
    membership: Arc<NodeRegistry>,
    clients: Arc<NodeClientPool>,
    metrics: StoreMetrics,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("node", &self.config.node_name)
            .field("classes", &self.schema.len())
            .field("directory", &self.directory)
            .finish()
    }
}

impl Coordinator {
    /// Build a node from configuration
    pub fn new(config: StoreConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let membership = NodeRegistry::with_peers(config.local_node(), config.peers.clone())?;
        let store = LocalShardStore::new(&config.node_name);
        let clients = NodeClientPool::new(
            LocalNodeClient::new(store.clone()),
            membership.clone(),
            config.request_timeout(),
        );
        Self::from_parts(config, membership, store, clients)
    }

    /// Build a node from pre-built membership, store and client pool
    ///
    /// Tests use this to inject fake clients for remote nodes.
    pub fn from_parts(
        config: StoreConfig,
        membership: Arc<NodeRegistry>,
        store: Arc<LocalShardStore>,
        clients: Arc<NodeClientPool>,
    ) -> Result<Arc<Self>> {
        if membership.local_node() != store.node_name() {
            return Err(Error::Configuration(format!(
                "local store belongs to {} but membership runs as {}",
                store.node_name(),
                membership.local_node()
            )));
        }

        let schema = SchemaRegistry::new();
        let directory = TenantDirectory::new(membership.clone(), clients.clone(), config.placement);
        let router = Router::new(
            schema.clone(),
            directory.clone(),
            clients.clone(),
            config.request_timeout(),
        );
        let status = ClusterStatusAggregator::new(
            membership.clone(),
            clients.clone(),
            config.status_timeout(),
            config.status_failure_policy,
        );

        Ok(Arc::new(Self {
            config,
            schema,
            directory,
            router,
            status,
            store,
            membership,
            clients,
            metrics: StoreMetrics::new()?,
        }))
    }

    /// A standalone node with default settings
    pub fn single_node(name: &str) -> Result<Arc<Self>> {
        Self::new(StoreConfig {
            node_name: name.to_string(),
            ..Default::default()
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn directory(&self) -> &Arc<TenantDirectory> {
        &self.directory
    }

    pub fn store(&self) -> &Arc<LocalShardStore> {
        &self.store
    }

    pub fn membership(&self) -> &Arc<NodeRegistry> {
        &self.membership
    }

    pub fn clients(&self) -> &Arc<NodeClientPool> {
        &self.clients
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Default bounds for calls to other nodes
    pub fn call_options(&self) -> CallOptions {
        CallOptions::new(self.config.request_timeout())
    }

    // =========================================================================
    // Classes
    // =========================================================================

    /// Register a class; classes without tenancy get their default shard
    pub async fn create_class(&self, class: Class) -> Result<Arc<Class>> {
        let class = self.schema.create_class(class)?;

        if !class.is_multi_tenant() {
            if let Err(e) = self.directory.create_default_shard(&class, &self.call_options()).await {
                warn!(class = %class.name, error = %e, "Default shard placement failed, removing class");
                self.schema.remove_class(&class.name);
                self.metrics.record_failure(&e);
                return Err(e);
            }
        }

        self.metrics.classes.set(self.schema.len() as i64);
        info!(class = %class.name, multi_tenant = class.is_multi_tenant(), "Class created");
        Ok(class)
    }

    pub fn get_class(&self, name: &str) -> Result<Arc<Class>> {
        self.schema.get_class(name)
    }

    pub fn list_classes(&self) -> Vec<Arc<Class>> {
        self.schema.list_classes()
    }

    /// Delete a class and every shard recorded for it
    ///
    /// Deleting an absent class succeeds, and also retries shard deletions
    /// left over from an earlier failed attempt.
    pub async fn delete_class(&self, name: &str) -> Result<()> {
        let removed = self.schema.remove_class(name).is_some();
        self.metrics.classes.set(self.schema.len() as i64);

        let deleted = self.directory.delete_class_shards(name, &self.call_options()).await?;
        if removed || deleted > 0 {
            info!(class = %name, shards = deleted, "Class deleted");
        }
        Ok(())
    }

    // =========================================================================
    // Tenants
    // =========================================================================

    pub async fn create_tenants(&self, class: &str, names: &[String]) -> Result<Vec<TenantOutcome>> {
        let class = self.schema.get_class(class)?;
        let options = self.call_options();
        let mut outcomes = self.directory.create_tenants(&class, names, &options).await?;

        // The class may have been deleted between the lookup and the
        // reservations, after the deletion scanned the directory.
        if self.schema.get_class(&class.name).is_err() {
            warn!(class = %class.name, "Class deleted during tenant creation, removing its shards");
            if let Err(e) = self.directory.delete_class_shards(&class.name, &options).await {
                warn!(class = %class.name, error = %e, "Cleanup of tenant shards failed");
            }
            for outcome in outcomes.iter_mut().filter(|o| o.is_ok()) {
                outcome.result = Err(Error::not_found("class", &class.name));
            }
        }

        self.record_outcomes(&outcomes, |m| m.tenants_created.inc());
        Ok(outcomes)
    }

    pub async fn delete_tenants(&self, class: &str, names: &[String]) -> Result<Vec<TenantOutcome>> {
        let class = self.schema.get_class(class)?;
        let outcomes = self
            .directory
            .delete_tenants(&class, names, &self.call_options())
            .await?;
        self.record_outcomes(&outcomes, |m| m.tenants_deleted.inc());
        Ok(outcomes)
    }

    pub fn list_tenants(&self, class: &str) -> Result<Vec<TenantEntry>> {
        let class = self.schema.get_class(class)?;
        self.directory.list_tenants(&class)
    }

    fn record_outcomes(&self, outcomes: &[TenantOutcome], on_success: impl Fn(&StoreMetrics)) {
        for outcome in outcomes {
            match &outcome.result {
                Ok(()) => on_success(&self.metrics),
                Err(e) => {
                    if e.is_transient() {
                        self.metrics.routing_failures.inc();
                    }
                }
            }
        }
    }

    // =========================================================================
    // Objects
    // =========================================================================

    pub async fn write_object(&self, class: &str, object: NewObject) -> Result<ObjectId> {
        self.write_object_with(class, object, &self.call_options()).await
    }

    /// Write with caller-supplied timeout and cancellation
    pub async fn write_object_with(&self, class: &str, object: NewObject, options: &CallOptions) -> Result<ObjectId> {
        match self.router.write_with(class, object, options).await {
            Ok(id) => {
                self.metrics.objects_written.inc();
                Ok(id)
            }
            Err(e) => {
                self.metrics.record_failure(&e);
                Err(e)
            }
        }
    }

    pub async fn get_object(&self, class: &str, id: ObjectId, tenant: Option<&str>) -> Result<StorageObject> {
        self.router.get(class, id, tenant).await
    }

    // =========================================================================
    // Cluster
    // =========================================================================

    /// Merged status of every registered node, optionally limited to one class
    pub async fn cluster_status(&self, class: Option<&str>) -> Result<ClusterStatus> {
        self.metrics.status_requests.inc();
        let result = self.status.get_status(class).await;
        if let Err(e) = &result {
            self.metrics.record_failure(e);
        }
        result
    }

    /// Probe every configured peer once and refresh liveness
    pub async fn refresh_membership(&self) -> usize {
        let peers: Vec<NodeClientRef> = self
            .membership
            .all_nodes()
            .into_iter()
            .filter(|entry| entry.info.name != self.config.node_name)
            .filter_map(|entry| self.clients.for_member(&entry.info).ok())
            .collect();
        let options = CallOptions::new(self.config.status_timeout());
        self.membership
            .probe(&peers, &options, self.config.heartbeat_timeout_secs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use assert_matches::assert_matches;

    fn tenant_class() -> Class {
        Class::new("MultiTenantClass")
            .with_property("tenantName", DataType::Text)
            .with_multi_tenancy("tenantName")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tenants_without_objects_report_empty_shards() {
        let coordinator = Coordinator::single_node("node-1").unwrap();
        coordinator.create_class(tenant_class()).await.unwrap();
        coordinator
            .create_tenants("MultiTenantClass", &names(&["A", "B", "C", "D"]))
            .await
            .unwrap();

        let status = coordinator.cluster_status(Some("MultiTenantClass")).await.unwrap();
        assert_eq!(status.total_shards(), 4);
        assert!(status.nodes[0].shards.iter().all(|s| s.object_count == 0));
        assert_eq!(coordinator.metrics().tenants_created.get(), 4);
    }

    #[tokio::test]
    async fn test_plain_class_gets_default_shard() {
        let coordinator = Coordinator::single_node("node-1").unwrap();
        coordinator
            .create_class(Class::new("Article").with_property("title", DataType::Text))
            .await
            .unwrap();

        let id = coordinator
            .write_object("Article", NewObject::new().with_property("title", "hello"))
            .await
            .unwrap();
        let stored = coordinator.get_object("Article", id, None).await.unwrap();
        assert_eq!(stored.tenant, None);

        assert_matches!(
            coordinator
                .write_object("Article", NewObject::new().with_tenant("t1"))
                .await,
            Err(Error::TenancyNotEnabled { .. })
        );
        assert_matches!(
            coordinator.create_tenants("Article", &names(&["t1"])).await,
            Err(Error::TenancyNotEnabled { .. })
        );
        assert_eq!(coordinator.metrics().objects_written.get(), 1);
    }

    #[tokio::test]
    async fn test_delete_class_is_idempotent() {
        let coordinator = Coordinator::single_node("node-1").unwrap();
        coordinator.create_class(tenant_class()).await.unwrap();
        coordinator
            .create_tenants("MultiTenantClass", &names(&["Tenant1", "Tenant2"]))
            .await
            .unwrap();
        coordinator
            .write_object(
                "MultiTenantClass",
                NewObject::new().with_property("tenantName", "Tenant1"),
            )
            .await
            .unwrap();

        coordinator.delete_class("MultiTenantClass").await.unwrap();
        assert_eq!(coordinator.store().shard_count(), 0);
        assert!(coordinator.directory().is_empty());
        assert_matches!(coordinator.get_class("MultiTenantClass"), Err(Error::NotFound { .. }));
        assert_matches!(
            coordinator
                .write_object(
                    "MultiTenantClass",
                    NewObject::new().with_property("tenantName", "Tenant1"),
                )
                .await,
            Err(Error::NotFound { .. })
        );

        coordinator.delete_class("MultiTenantClass").await.unwrap();
        coordinator.delete_class("NeverExisted").await.unwrap();

        // The name is free again
        coordinator.create_class(tenant_class()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deleted_tenant_leaves_status_and_rejects_writes() {
        let coordinator = Coordinator::single_node("node-1").unwrap();
        coordinator.create_class(tenant_class()).await.unwrap();
        coordinator
            .create_tenants("MultiTenantClass", &names(&["Tenant1", "Tenant2"]))
            .await
            .unwrap();

        let outcomes = coordinator
            .delete_tenants("MultiTenantClass", &names(&["Tenant1"]))
            .await
            .unwrap();
        assert!(outcomes[0].is_ok());

        let status = coordinator.cluster_status(None).await.unwrap();
        let shards: Vec<_> = status.nodes[0].shards.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(shards, vec!["Tenant2"]);
        assert_matches!(
            coordinator
                .write_object(
                    "MultiTenantClass",
                    NewObject::new().with_property("tenantName", "Tenant1"),
                )
                .await,
            Err(Error::NotFound { .. })
        );
        assert_eq!(coordinator.metrics().tenants_deleted.get(), 1);
    }

    #[tokio::test]
    async fn test_invalid_class_rejected() {
        let coordinator = Coordinator::single_node("node-1").unwrap();
        let bad = Class::new("Bad")
            .with_property("count", DataType::Int)
            .with_multi_tenancy("count");
        assert_matches!(coordinator.create_class(bad).await, Err(Error::InvalidConfig(_)));
        assert_matches!(coordinator.create_class(tenant_class()).await, Ok(_));
        assert_matches!(coordinator.create_class(tenant_class()).await, Err(Error::Conflict { .. }));
        assert_eq!(coordinator.list_classes().len(), 1);
    }

    #[test]
    fn test_mismatched_parts_rejected() {
        let membership = NodeRegistry::new(crate::domain::ports::NodeInfo::new("node-1"));
        let store = LocalShardStore::new("node-2");
        let clients = NodeClientPool::new(
            LocalNodeClient::new(store.clone()),
            membership.clone(),
            std::time::Duration::from_secs(1),
        );
        assert_matches!(
            Coordinator::from_parts(StoreConfig::default(), membership, store, clients),
            Err(Error::Configuration(_))
        );
    }
}
