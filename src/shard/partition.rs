//! Shard
//!
//! A shard owns every object of exactly one (class, tenant) pair. Mutations
//! take the write half of the shard lock and reads take the read half, so
//! a count or get never observes a half-applied put or delete.

use crate::domain::object::{ObjectId, StorageObject};
use crate::domain::ports::{ShardSpec, ShardStatus};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

// =============================================================================
// Shard State
// =============================================================================

/// Lifecycle state of a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Accepting reads and writes
    Active,
    /// Deleted; every operation fails `ShardGone`
    Deleted,
}

// =============================================================================
// Shard Statistics
// =============================================================================

/// Operation counters for a shard
#[derive(Debug, Default)]
pub struct ShardStats {
    /// Successful puts
    pub put_count: AtomicU64,
    /// Successful gets
    pub get_count: AtomicU64,
    /// Puts rejected by tenant validation
    pub rejected_count: AtomicU64,
}

/// Snapshot of shard counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardStatsSnapshot {
    pub put_count: u64,
    pub get_count: u64,
    pub rejected_count: u64,
}

impl ShardStats {
    pub fn snapshot(&self) -> ShardStatsSnapshot {
        ShardStatsSnapshot {
            put_count: self.put_count.load(Ordering::Relaxed),
            get_count: self.get_count.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Shard
// =============================================================================

#[derive(Debug)]
struct ShardInner {
    objects: HashMap<ObjectId, StorageObject>,
    state: ShardState,
}

/// A tenant-owned partition of objects
#[derive(Debug)]
pub struct Shard {
    spec: ShardSpec,
    inner: RwLock<ShardInner>,
    stats: ShardStats,
    created_at: DateTime<Utc>,
}

impl Shard {
    /// Create an empty, active shard
    pub fn new(spec: ShardSpec) -> Self {
        Self {
            spec,
            inner: RwLock::new(ShardInner {
                objects: HashMap::new(),
                state: ShardState::Active,
            }),
            stats: ShardStats::default(),
            created_at: Utc::now(),
        }
    }

    pub fn spec(&self) -> &ShardSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.shard
    }

    pub fn class(&self) -> &str {
        &self.spec.class
    }

    pub fn tenant(&self) -> Option<&str> {
        self.spec.tenant.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> ShardState {
        self.inner.read().state
    }

    pub fn is_operational(&self) -> bool {
        self.state() == ShardState::Active
    }

    pub fn stats(&self) -> ShardStatsSnapshot {
        self.stats.snapshot()
    }

    fn gone(&self) -> Error {
        Error::ShardGone {
            class: self.spec.class.clone(),
            shard: self.spec.shard.clone(),
        }
    }

    /// Check that an object may live in this shard
    fn check_ownership(&self, object: &StorageObject) -> Result<()> {
        if object.class != self.spec.class {
            return Err(Error::InvalidObject(format!(
                "object of class {} cannot be stored in shard {}/{}",
                object.class, self.spec.class, self.spec.shard
            )));
        }

        match (&self.spec.tenant, &self.spec.tenant_key) {
            (Some(tenant), Some(key)) => {
                let value = object.property(key).and_then(|v| v.as_text());
                if value != Some(tenant.as_str()) {
                    return Err(Error::TenantMismatch {
                        expected: tenant.clone(),
                        actual: value.map(str::to_string),
                    });
                }
                if let Some(declared) = &object.tenant {
                    if declared != tenant {
                        return Err(Error::TenantMismatch {
                            expected: tenant.clone(),
                            actual: Some(declared.clone()),
                        });
                    }
                }
                Ok(())
            }
            _ if object.tenant.is_some() => Err(Error::TenancyNotEnabled {
                class: self.spec.class.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Insert or overwrite an object
    pub fn put(&self, mut object: StorageObject) -> Result<ObjectId> {
        if let Err(e) = self.check_ownership(&object) {
            self.stats.rejected_count.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        object.tenant = self.spec.tenant.clone();

        let mut inner = self.inner.write();
        if inner.state == ShardState::Deleted {
            return Err(self.gone());
        }

        let id = object.id;
        if let Some(existing) = inner.objects.get(&id) {
            object.creation_time_unix = existing.creation_time_unix;
        }
        inner.objects.insert(id, object);
        self.stats.put_count.fetch_add(1, Ordering::Relaxed);

        debug!(class = %self.spec.class, shard = %self.spec.shard, id = %id, "Stored object");
        Ok(id)
    }

    /// Read an object by ID
    pub fn get(&self, id: ObjectId) -> Result<StorageObject> {
        let inner = self.inner.read();
        if inner.state == ShardState::Deleted {
            return Err(self.gone());
        }
        let object = inner
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("object", id.to_string()))?;
        self.stats.get_count.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    /// Current live object count
    pub fn count(&self) -> Result<u64> {
        let inner = self.inner.read();
        if inner.state == ShardState::Deleted {
            return Err(self.gone());
        }
        Ok(inner.objects.len() as u64)
    }

    /// Status record for cluster reporting
    pub fn status(&self) -> Result<ShardStatus> {
        Ok(ShardStatus {
            name: self.spec.shard.clone(),
            class: self.spec.class.clone(),
            tenant: self.spec.tenant.clone(),
            object_count: self.count()?,
        })
    }

    /// Remove all objects and mark the shard non-operational
    ///
    /// Returns the number of objects dropped.
    pub fn delete(&self) -> Result<u64> {
        let mut inner = self.inner.write();
        if inner.state == ShardState::Deleted {
            return Err(self.gone());
        }
        let dropped = inner.objects.len() as u64;
        inner.objects.clear();
        inner.state = ShardState::Deleted;
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::object::{NewObject, Properties};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn tenant_shard(tenant: &str) -> Shard {
        Shard::new(ShardSpec::for_tenant("MultiTenantClass", tenant, "tenantName"))
    }

    fn object_for(tenant: &str) -> StorageObject {
        let props = NewObject::new().with_property("tenantName", tenant).properties;
        StorageObject::new(ObjectId::generate(), "MultiTenantClass", None, props)
    }

    #[test]
    fn test_put_get_count() {
        let shard = tenant_shard("Tenant1");
        let obj = object_for("Tenant1");
        let id = shard.put(obj).unwrap();

        let stored = shard.get(id).unwrap();
        assert_eq!(stored.tenant.as_deref(), Some("Tenant1"));
        assert_eq!(shard.count().unwrap(), 1);
        assert_eq!(shard.stats().put_count, 1);
    }

    #[test]
    fn test_overwrite_keeps_count_and_creation_time() {
        let shard = tenant_shard("Tenant1");
        let obj = object_for("Tenant1");
        let id = obj.id;
        let created = obj.creation_time_unix;
        shard.put(obj.clone()).unwrap();

        let mut updated = obj;
        updated.creation_time_unix = created + 1000;
        shard.put(updated).unwrap();

        assert_eq!(shard.count().unwrap(), 1);
        assert_eq!(shard.get(id).unwrap().creation_time_unix, created);
    }

    #[test]
    fn test_tenant_mismatch_rejected() {
        let shard = tenant_shard("Tenant1");
        let result = shard.put(object_for("Tenant2"));
        assert_matches!(
            result,
            Err(Error::TenantMismatch { expected, actual }) if expected == "Tenant1" && actual.as_deref() == Some("Tenant2")
        );
        assert_eq!(shard.count().unwrap(), 0);
        assert_eq!(shard.stats().rejected_count, 1);
    }

    #[test]
    fn test_missing_tenant_value_is_mismatch() {
        let shard = tenant_shard("Tenant1");
        let obj = StorageObject::new(ObjectId::generate(), "MultiTenantClass", None, Properties::new());
        assert_matches!(shard.put(obj), Err(Error::TenantMismatch { actual: None, .. }));
    }

    #[test]
    fn test_declared_tenant_must_match() {
        let shard = tenant_shard("Tenant1");
        let mut obj = object_for("Tenant1");
        obj.tenant = Some("Tenant3".into());
        assert_matches!(shard.put(obj), Err(Error::TenantMismatch { .. }));
    }

    #[test]
    fn test_single_shard_rejects_tenant() {
        let shard = Shard::new(ShardSpec::single("Plain", "_default"));
        let mut obj = StorageObject::new(ObjectId::generate(), "Plain", None, Properties::new());
        shard.put(obj.clone()).unwrap();

        obj.tenant = Some("Tenant1".into());
        assert_matches!(shard.put(obj), Err(Error::TenancyNotEnabled { .. }));
    }

    #[test]
    fn test_wrong_class_rejected() {
        let shard = tenant_shard("Tenant1");
        let mut obj = object_for("Tenant1");
        obj.class = "Other".into();
        assert_matches!(shard.put(obj), Err(Error::InvalidObject(_)));
    }

    #[test]
    fn test_get_missing_object() {
        let shard = tenant_shard("Tenant1");
        assert_matches!(shard.get(ObjectId::generate()), Err(Error::NotFound { .. }));
    }

    #[test]
    fn test_deleted_shard_is_gone() {
        let shard = tenant_shard("Tenant1");
        let id = shard.put(object_for("Tenant1")).unwrap();

        assert_eq!(shard.delete().unwrap(), 1);
        assert!(!shard.is_operational());
        assert_matches!(shard.count(), Err(Error::ShardGone { .. }));
        assert_matches!(shard.get(id), Err(Error::ShardGone { .. }));
        assert_matches!(shard.put(object_for("Tenant1")), Err(Error::ShardGone { .. }));
        assert_matches!(shard.delete(), Err(Error::ShardGone { .. }));
    }

    #[test]
    fn test_concurrent_puts_lose_nothing() {
        let shard = Arc::new(tenant_shard("Tenant1"));
        let writers = 8;
        let per_writer = 250;

        let handles: Vec<_> = (0..writers)
            .map(|_| {
                let shard = shard.clone();
                std::thread::spawn(move || {
                    for _ in 0..per_writer {
                        shard.put(object_for("Tenant1")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shard.count().unwrap(), (writers * per_writer) as u64);
    }
}
