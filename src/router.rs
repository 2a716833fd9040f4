//! Object Router
//!
//! Derives the tenant of an incoming object from its class's tenant key,
//! resolves the owning shard through the tenant directory and dispatches the
//! operation to the owning node.
//!
//! Local shards are called directly. A remote node gets exactly one attempt,
//! bounded by a timeout and cancellable by the caller; timeouts and transport
//! failures surface as `Routing` errors and are never retried here.

use crate::cluster::client::{bounded, CallOptions, NodeClientPool};
use crate::domain::object::{NewObject, ObjectId, PropertyValue, StorageObject};
use crate::domain::ports::NodeClientRef;
use crate::error::{Error, Result};
use crate::schema::{Class, SchemaRegistry};
use crate::tenancy::{ShardLocation, TenantDirectory};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Derive the tenant an object belongs to
///
/// Returns `None` for classes without multi-tenancy.
pub fn derive_tenant(class: &Class, object: &NewObject) -> Result<Option<String>> {
    let Some(key) = class.tenant_key() else {
        if object.tenant.is_some() {
            return Err(Error::TenancyNotEnabled {
                class: class.name.clone(),
            });
        }
        return Ok(None);
    };

    let value = object
        .properties
        .get(key)
        .and_then(PropertyValue::as_text)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::MissingTenantValue {
            class: class.name.clone(),
            tenant_key: key.to_string(),
        })?;

    if let Some(declared) = &object.tenant {
        if declared != value {
            return Err(Error::TenantMismatch {
                expected: value.to_string(),
                actual: Some(declared.clone()),
            });
        }
    }
    Ok(Some(value.to_string()))
}

/// Routes object reads and writes to owning shards
pub struct Router {
    schema: Arc<SchemaRegistry>,
    directory: Arc<TenantDirectory>,
    clients: Arc<NodeClientPool>,
    timeout: Duration,
}

impl Router {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        directory: Arc<TenantDirectory>,
        clients: Arc<NodeClientPool>,
        timeout: Duration,
    ) -> Self {
        Self {
            schema,
            directory,
            clients,
            timeout,
        }
    }

    /// Default bounds for remote calls
    pub fn call_options(&self) -> CallOptions {
        CallOptions::new(self.timeout)
    }

    /// Write an object, returning its identifier
    pub async fn write(&self, class: &str, object: NewObject) -> Result<ObjectId> {
        self.write_with(class, object, &self.call_options()).await
    }

    pub async fn write_with(&self, class: &str, object: NewObject, options: &CallOptions) -> Result<ObjectId> {
        let class = self.schema.get_class(class)?;
        class.validate_properties(&object.properties)?;
        let tenant = derive_tenant(&class, &object)?;
        let location = self.locate(&class, tenant.as_deref())?;

        let id = object.id.unwrap_or_else(ObjectId::generate);
        let stored = StorageObject::new(id, &class.name, tenant, object.properties);
        debug!(class = %class.name, shard = %location.shard, node = %location.node, id = %id, "Routing write");

        let client = self.clients.get(&location.node)?;
        let shard = location.shard.clone();
        let class_name = class.name.clone();
        self.dispatch(&client, &location, options, async {
            client.put_object(&class_name, &shard, stored).await
        })
        .await
    }

    /// Read an object from its owning shard
    pub async fn get(&self, class: &str, id: ObjectId, tenant: Option<&str>) -> Result<StorageObject> {
        self.get_with(class, id, tenant, &self.call_options()).await
    }

    pub async fn get_with(
        &self,
        class: &str,
        id: ObjectId,
        tenant: Option<&str>,
        options: &CallOptions,
    ) -> Result<StorageObject> {
        let class = self.schema.get_class(class)?;
        let tenant = match (class.tenant_key(), tenant) {
            (None, Some(_)) => {
                return Err(Error::TenancyNotEnabled {
                    class: class.name.clone(),
                })
            }
            (Some(key), None) | (Some(key), Some("")) => {
                return Err(Error::MissingTenantValue {
                    class: class.name.clone(),
                    tenant_key: key.to_string(),
                })
            }
            (_, tenant) => tenant,
        };
        let location = self.locate(&class, tenant)?;

        let client = self.clients.get(&location.node)?;
        let shard = location.shard.clone();
        self.dispatch(&client, &location, options, async {
            client.get_object(&class.name, &shard, id).await
        })
        .await
    }

    fn locate(&self, class: &Class, tenant: Option<&str>) -> Result<ShardLocation> {
        match tenant {
            Some(tenant) => self.directory.resolve(&class.name, tenant),
            None => self.directory.resolve_default(&class.name),
        }
    }

    async fn dispatch<T, F>(
        &self,
        client: &NodeClientRef,
        location: &ShardLocation,
        options: &CallOptions,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if client.is_local() {
            return call.await;
        }

        let result = bounded(&location.node, options, call).await;
        if let Err(e @ Error::Routing { .. }) = &result {
            warn!(node = %location.node, shard = %location.shard, error = %e, "Remote shard call failed");
        }
        result
    }
}
