//! Tenant Directory
//!
//! Maps each tenant of a class to its shard and owning node, and drives
//! shard creation and deletion on the owning nodes.
//!
//! Entries move through three states. A name is reserved in `Creating`
//! before any node is contacted, so two concurrent creations of the same
//! tenant can never allocate two shards. The entry becomes `Active` only
//! after the owning node confirms the shard. Deletion marks the entry
//! `Deleting` and removes it once the node confirms; a failed deletion
//! leaves it `Deleting` until the caller retries.
//!
//! Deleting a class while some of its tenants are still `Creating` marks
//! those reservations `Deleting` as well. The in-flight creation then
//! removes the shard it made instead of activating it, and the class
//! deletion waits for those creations to settle.
//!
//! No directory lock is held across a node call.

use super::events::TenantEvent;
use super::placement::{PlacementEngine, PlacementPolicy};
use crate::cluster::client::{bounded, CallOptions, NodeClientPool};
use crate::domain::ports::{Membership, ShardSpec};
use crate::error::{Error, Result};
use crate::schema::Class;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

/// Shard name used by classes without multi-tenancy
pub const DEFAULT_SHARD: &str = "_default";

// =============================================================================
// Directory Entries
// =============================================================================

/// Lifecycle state of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantState {
    /// Reserved; the owning node has not confirmed the shard yet
    Creating,
    /// Shard confirmed and accepting traffic
    Active,
    /// Shard deletion requested but not confirmed
    Deleting,
}

impl std::fmt::Display for TenantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantState::Creating => write!(f, "creating"),
            TenantState::Active => write!(f, "active"),
            TenantState::Deleting => write!(f, "deleting"),
        }
    }
}

/// Placement record of one tenant (or of a class's default shard)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantEntry {
    pub name: String,
    pub node: String,
    pub shard: String,
    pub state: TenantState,
}

/// Where a resolved shard lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLocation {
    pub node: String,
    pub shard: String,
}

/// Result for one tenant of a batch operation
#[derive(Debug)]
pub struct TenantOutcome {
    pub name: String,
    pub result: Result<()>,
}

impl TenantOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct DirectoryKey {
    class: String,
    shard: String,
}

impl DirectoryKey {
    fn new(class: &str, shard: &str) -> Self {
        Self {
            class: class.to_string(),
            shard: shard.to_string(),
        }
    }
}

// =============================================================================
// Tenant Directory
// =============================================================================

/// Cluster-wide tenant to shard mapping
pub struct TenantDirectory {
    entries: DashMap<DirectoryKey, TenantEntry>,
    /// Reservations whose shard creation has not settled yet
    in_flight: DashSet<DirectoryKey>,
    settled: Notify,
    placement: PlacementEngine,
    membership: Arc<dyn Membership>,
    clients: Arc<NodeClientPool>,
    event_sender: broadcast::Sender<TenantEvent>,
}

impl std::fmt::Debug for TenantDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDirectory")
            .field("entries", &self.entries.len())
            .field("placement", &self.placement.policy())
            .finish()
    }
}

impl TenantDirectory {
    pub fn new(
        membership: Arc<dyn Membership>,
        clients: Arc<NodeClientPool>,
        policy: PlacementPolicy,
    ) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(1024);
        Arc::new(Self {
            entries: DashMap::new(),
            in_flight: DashSet::new(),
            settled: Notify::new(),
            placement: PlacementEngine::new(policy),
            membership,
            clients,
            event_sender,
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TenantEvent> {
        self.event_sender.subscribe()
    }

    pub fn placement_policy(&self) -> PlacementPolicy {
        self.placement.policy()
    }

    fn emit(&self, event: TenantEvent) {
        debug!(event = %event, "Directory event");
        let _ = self.event_sender.send(event);
    }

    // =========================================================================
    // Tenants
    // =========================================================================

    /// Create tenants of a multi-tenant class
    ///
    /// Each tenant succeeds or fails on its own; the returned outcomes are in
    /// input order. Tenants created before a failure stay created.
    pub async fn create_tenants(
        &self,
        class: &Class,
        names: &[String],
        options: &CallOptions,
    ) -> Result<Vec<TenantOutcome>> {
        let tenant_key = class.tenant_key().ok_or_else(|| Error::TenancyNotEnabled {
            class: class.name.clone(),
        })?;

        // Reserve in input order so a duplicate within the batch conflicts
        // on its second occurrence.
        let mut outcomes = Vec::with_capacity(names.len());
        let mut reserved = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let reservation = if name.is_empty() {
                Err(Error::InvalidConfig("tenant name must not be empty".into()))
            } else {
                self.reserve(&class.name, name)
            };
            let result = match reservation {
                Ok(entry) => {
                    reserved.push((index, entry));
                    Ok(())
                }
                Err(e) => Err(e),
            };
            outcomes.push(TenantOutcome {
                name: name.clone(),
                result,
            });
        }

        let provisioned = join_all(reserved.into_iter().map(|(index, entry)| {
            let spec = ShardSpec::for_tenant(&class.name, &entry.name, tenant_key);
            async move { (index, self.provision(&class.name, entry, spec, options).await) }
        }))
        .await;

        for (index, result) in provisioned {
            outcomes[index].result = result;
        }
        Ok(outcomes)
    }

    /// Delete tenants of a multi-tenant class together with their shards
    pub async fn delete_tenants(
        &self,
        class: &Class,
        names: &[String],
        options: &CallOptions,
    ) -> Result<Vec<TenantOutcome>> {
        if !class.is_multi_tenant() {
            return Err(Error::TenancyNotEnabled {
                class: class.name.clone(),
            });
        }

        let mut outcomes = Vec::with_capacity(names.len());
        let mut marked = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let result = match self.mark_deleting(&class.name, name) {
                Ok(entry) => {
                    marked.push((index, entry));
                    Ok(())
                }
                Err(e) => Err(e),
            };
            outcomes.push(TenantOutcome {
                name: name.clone(),
                result,
            });
        }

        let removed = join_all(marked.into_iter().map(|(index, entry)| async move {
            (index, self.remove_shard(&class.name, entry, options).await)
        }))
        .await;

        for (index, result) in removed {
            outcomes[index].result = result;
        }
        Ok(outcomes)
    }

    /// Locate the shard of an active tenant
    pub fn resolve(&self, class: &str, tenant: &str) -> Result<ShardLocation> {
        self.active_location(class, tenant)
            .ok_or_else(|| Error::not_found("tenant", tenant))
    }

    /// Locate the default shard of a class without multi-tenancy
    pub fn resolve_default(&self, class: &str) -> Result<ShardLocation> {
        self.active_location(class, DEFAULT_SHARD)
            .ok_or_else(|| Error::not_found("shard", format!("{}/{}", class, DEFAULT_SHARD)))
    }

    fn active_location(&self, class: &str, shard: &str) -> Option<ShardLocation> {
        self.entries
            .get(&DirectoryKey::new(class, shard))
            .filter(|entry| entry.state == TenantState::Active)
            .map(|entry| ShardLocation {
                node: entry.node.clone(),
                shard: entry.shard.clone(),
            })
    }

    /// All tenants of a class in any state, ordered by name
    pub fn list_tenants(&self, class: &Class) -> Result<Vec<TenantEntry>> {
        if !class.is_multi_tenant() {
            return Err(Error::TenancyNotEnabled {
                class: class.name.clone(),
            });
        }
        Ok(self.entries_for_class(&class.name))
    }

    // =========================================================================
    // Class Lifecycle
    // =========================================================================

    /// Place and create the single shard of a class without multi-tenancy
    pub async fn create_default_shard(&self, class: &Class, options: &CallOptions) -> Result<TenantEntry> {
        if class.is_multi_tenant() {
            return Err(Error::Internal(format!(
                "class {} is multi-tenant and has no default shard",
                class.name
            )));
        }
        let entry = self.reserve(&class.name, DEFAULT_SHARD)?;
        let spec = ShardSpec::single(&class.name, DEFAULT_SHARD);
        self.provision(&class.name, entry.clone(), spec, options).await?;
        Ok(TenantEntry {
            state: TenantState::Active,
            ..entry
        })
    }

    /// Delete every shard recorded for a class
    ///
    /// Tenants still being created are abandoned: their creation rolls the
    /// shard back once the owning node answers, and this call waits for
    /// that within the call timeout. Returns the number of shards deleted,
    /// or the first failure once all deletions have run.
    pub async fn delete_class_shards(&self, class: &str, options: &CallOptions) -> Result<usize> {
        let keys: Vec<DirectoryKey> = self
            .entries
            .iter()
            .filter(|e| e.key().class == class)
            .map(|e| e.key().clone())
            .collect();

        let mut abandoned = Vec::new();
        let mut marked = Vec::new();
        for key in keys {
            let abandon = match self.entries.get_mut(&key) {
                Some(mut recorded) => match recorded.state {
                    TenantState::Creating => {
                        recorded.state = TenantState::Deleting;
                        true
                    }
                    TenantState::Deleting => self.in_flight.contains(&key),
                    TenantState::Active => false,
                },
                None => continue,
            };
            if abandon {
                abandoned.push(key);
            } else if let Ok(entry) = self.mark_deleting(class, &key.shard) {
                marked.push(entry);
            }
        }

        let results = join_all(marked.into_iter().map(|entry| self.remove_shard(class, entry, options))).await;

        if !abandoned.is_empty() {
            debug!(class = %class, pending = abandoned.len(), "Waiting for in-flight tenant creations");
            if !self.await_settled(&abandoned, options).await {
                warn!(class = %class, "Tenant creations still in flight; they roll back when they finish");
            }
        }

        let total = results.len();
        let mut deleted = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!(class = %class, deleted, total, "Some shards of the class could not be deleted");
                Err(e)
            }
            None => Ok(deleted),
        }
    }

    /// Wait until none of `keys` has a creation in flight
    ///
    /// Returns false when the call timeout or cancellation ends the wait.
    async fn await_settled(&self, keys: &[DirectoryKey], options: &CallOptions) -> bool {
        let deadline = tokio::time::Instant::now() + options.timeout;
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !keys.iter().any(|key| self.in_flight.contains(key)) {
                return true;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = options.cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => return false,
            }
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Entries of a class in any state, ordered by name
    pub fn entries_for_class(&self, class: &str) -> Vec<TenantEntry> {
        let mut entries: Vec<TenantEntry> = self
            .entries
            .iter()
            .filter(|e| e.key().class == class)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Number of recorded shards per node
    pub fn load(&self) -> HashMap<String, usize> {
        let mut load = HashMap::new();
        for entry in self.entries.iter() {
            *load.entry(entry.value().node.clone()).or_insert(0) += 1;
        }
        load
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn reserve(&self, class: &str, shard: &str) -> Result<TenantEntry> {
        let key = DirectoryKey::new(class, shard);
        if self.entries.contains_key(&key) {
            return Err(Error::conflict("tenant", shard));
        }

        // Choose the node before taking the entry guard; load() walks the map.
        let node = self.placement.select(&self.membership.live_nodes(), &self.load())?;

        let entry = match self.entries.entry(key) {
            Entry::Occupied(_) => return Err(Error::conflict("tenant", shard)),
            Entry::Vacant(slot) => {
                let entry = TenantEntry {
                    name: shard.to_string(),
                    node,
                    shard: shard.to_string(),
                    state: TenantState::Creating,
                };
                slot.insert(entry.clone());
                self.in_flight.insert(DirectoryKey::new(class, shard));
                entry
            }
        };

        self.emit(TenantEvent::ShardPlaced {
            class: class.to_string(),
            shard: entry.shard.clone(),
            node: entry.node.clone(),
        });
        Ok(entry)
    }

    async fn provision(
        &self,
        class: &str,
        entry: TenantEntry,
        spec: ShardSpec,
        options: &CallOptions,
    ) -> Result<()> {
        let key = DirectoryKey::new(class, &entry.shard);
        let result = self.settle(class, &key, entry, spec, options).await;
        self.in_flight.remove(&key);
        self.settled.notify_waiters();
        result
    }

    async fn settle(
        &self,
        class: &str,
        key: &DirectoryKey,
        entry: TenantEntry,
        spec: ShardSpec,
        options: &CallOptions,
    ) -> Result<()> {
        let result = match self.clients.get(&entry.node) {
            Ok(client) => bounded(&entry.node, options, client.create_shard(spec)).await,
            Err(e) => Err(e),
        };

        // A shard left behind by an earlier attempt whose confirmation was
        // lost is taken over rather than reported as a conflict.
        let result = match result {
            Err(Error::Conflict { kind, .. }) if kind == "shard" => {
                debug!(class = %class, shard = %entry.shard, node = %entry.node, "Adopting existing shard");
                Ok(())
            }
            other => other,
        };

        // Activate only a reservation nobody abandoned in the meantime.
        let abandoned = match self.entries.get_mut(key) {
            Some(mut recorded) if recorded.state == TenantState::Creating => {
                if result.is_ok() {
                    recorded.state = TenantState::Active;
                }
                false
            }
            _ => true,
        };

        if abandoned {
            warn!(class = %class, tenant = %entry.name, node = %entry.node, "Class deleted during tenant creation, rolling back shard");
            let rollback = TenantEntry {
                state: TenantState::Deleting,
                ..entry
            };
            // A failed rollback leaves the entry `Deleting` for the next
            // class deletion to retry.
            let _ = self.remove_shard(class, rollback, options).await;
            return Err(Error::not_found("class", class));
        }

        match result {
            Ok(()) => {
                info!(class = %class, tenant = %entry.name, node = %entry.node, "Tenant shard created");
                self.emit(TenantEvent::TenantCreated {
                    class: class.to_string(),
                    tenant: entry.name,
                    node: entry.node,
                });
                Ok(())
            }
            Err(e) => {
                self.entries
                    .remove_if(key, |_, recorded| recorded.state == TenantState::Creating);
                warn!(class = %class, tenant = %entry.name, node = %entry.node, error = %e, "Tenant shard creation failed");
                Err(e)
            }
        }
    }

    fn mark_deleting(&self, class: &str, shard: &str) -> Result<TenantEntry> {
        let mut entry = self
            .entries
            .get_mut(&DirectoryKey::new(class, shard))
            .ok_or_else(|| Error::not_found("tenant", shard))?;
        if entry.state == TenantState::Creating {
            return Err(Error::not_found("tenant", shard));
        }
        entry.state = TenantState::Deleting;
        Ok(entry.value().clone())
    }

    async fn remove_shard(&self, class: &str, entry: TenantEntry, options: &CallOptions) -> Result<()> {
        let result = match self.clients.get(&entry.node) {
            Ok(client) => bounded(&entry.node, options, client.delete_shard(class, &entry.shard)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) | Err(Error::NotFound { .. }) => {
                self.entries.remove_if(&DirectoryKey::new(class, &entry.shard), |_, recorded| {
                    recorded.state == TenantState::Deleting
                });
                info!(class = %class, tenant = %entry.name, node = %entry.node, "Tenant shard deleted");
                self.emit(TenantEvent::TenantDeleted {
                    class: class.to_string(),
                    tenant: entry.name,
                    node: entry.node,
                });
                Ok(())
            }
            Err(e) => {
                warn!(class = %class, tenant = %entry.name, node = %entry.node, error = %e, "Tenant shard deletion failed");
                self.emit(TenantEvent::TenantDeletionFailed {
                    class: class.to_string(),
                    tenant: entry.name,
                    node: entry.node,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
