//! Schema Registry
//!
//! Exclusive owner of class definitions. Classes are shared out as
//! `Arc<Class>` snapshots; the registry itself only ever inserts and
//! removes whole classes.

use super::class::Class;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Registry of class definitions keyed by class name
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    classes: RwLock<BTreeMap<String, Arc<Class>>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a class
    ///
    /// Fails `InvalidConfig` for a malformed definition and `Conflict` if
    /// the name is taken.
    pub fn create_class(&self, class: Class) -> Result<Arc<Class>> {
        class.validate()?;

        let mut classes = self.classes.write();
        if classes.contains_key(&class.name) {
            return Err(Error::conflict("class", &class.name));
        }

        info!(
            class = %class.name,
            multi_tenant = class.is_multi_tenant(),
            properties = class.properties.len(),
            "Registered class"
        );

        let class = Arc::new(class);
        classes.insert(class.name.clone(), class.clone());
        Ok(class)
    }

    /// Get a class by name
    pub fn get_class(&self, name: &str) -> Result<Arc<Class>> {
        self.classes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("class", name))
    }

    /// Check if a class exists
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// All classes ordered by name
    pub fn list_classes(&self) -> Vec<Arc<Class>> {
        self.classes.read().values().cloned().collect()
    }

    /// Remove a class, returning its definition if it was present
    pub fn remove_class(&self, name: &str) -> Option<Arc<Class>> {
        let removed = self.classes.write().remove(name);
        if removed.is_some() {
            info!(class = %name, "Removed class");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use assert_matches::assert_matches;

    fn mt_class(name: &str) -> Class {
        Class::new(name)
            .with_property("tenantName", DataType::String)
            .with_multi_tenancy("tenantName")
    }

    #[test]
    fn test_create_and_get_class() {
        let registry = SchemaRegistry::new();
        registry.create_class(mt_class("MultiTenantClass")).unwrap();

        let class = registry.get_class("MultiTenantClass").unwrap();
        assert!(class.is_multi_tenant());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_class_conflicts() {
        let registry = SchemaRegistry::new();
        registry.create_class(mt_class("Foo")).unwrap();
        assert_matches!(registry.create_class(mt_class("Foo")), Err(Error::Conflict { .. }));
    }

    #[test]
    fn test_invalid_class_rejected() {
        let registry = SchemaRegistry::new();
        let bad = Class::new("Foo").with_multi_tenancy("missing");
        assert_matches!(registry.create_class(bad), Err(Error::InvalidConfig(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_missing_class() {
        let registry = SchemaRegistry::new();
        assert_matches!(registry.get_class("Nope"), Err(Error::NotFound { .. }));
    }

    #[test]
    fn test_list_and_remove() {
        let registry = SchemaRegistry::new();
        registry.create_class(mt_class("Zeta")).unwrap();
        registry.create_class(mt_class("Alpha")).unwrap();

        let names: Vec<_> = registry.list_classes().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);

        assert!(registry.remove_class("Alpha").is_some());
        assert!(registry.remove_class("Alpha").is_none());
        assert!(!registry.contains("Alpha"));
    }
}
