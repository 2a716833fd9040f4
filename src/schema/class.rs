//! Class Definitions
//!
//! A class names a schema: its ordered properties and its multi-tenancy
//! configuration. Validation happens once at creation; the tenancy
//! configuration never changes afterwards.

use crate::domain::object::{Properties, PropertyValue};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// =============================================================================
// Data Types
// =============================================================================

/// Declared data type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "text")]
    Text,
    /// Legacy scalar string type
    #[serde(rename = "string")]
    String,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    /// RFC 3339 timestamp carried as text
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "uuid")]
    Uuid,
    #[serde(rename = "text[]")]
    TextArray,
    #[serde(rename = "int[]")]
    IntArray,
    #[serde(rename = "number[]")]
    NumberArray,
    #[serde(rename = "boolean[]")]
    BooleanArray,
}

impl DataType {
    /// Scalar string types may act as tenant key
    pub fn is_scalar_string(&self) -> bool {
        matches!(self, DataType::Text | DataType::String)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            DataType::TextArray | DataType::IntArray | DataType::NumberArray | DataType::BooleanArray
        )
    }

    /// Check whether a value conforms to this type
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        if self.is_array() && value.is_empty_array() {
            return true;
        }
        match (self, value) {
            (DataType::Text | DataType::String, PropertyValue::Text(_)) => true,
            (DataType::Int, PropertyValue::Int(_)) => true,
            (DataType::Number, PropertyValue::Number(_) | PropertyValue::Int(_)) => true,
            (DataType::Boolean, PropertyValue::Boolean(_)) => true,
            (DataType::Date, PropertyValue::Text(s)) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            (DataType::Uuid, PropertyValue::Text(s)) => uuid::Uuid::parse_str(s).is_ok(),
            (DataType::TextArray, PropertyValue::TextArray(_)) => true,
            (DataType::IntArray, PropertyValue::IntArray(_)) => true,
            (DataType::NumberArray, PropertyValue::NumberArray(_) | PropertyValue::IntArray(_)) => true,
            (DataType::BooleanArray, PropertyValue::BooleanArray(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Text => "text",
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Uuid => "uuid",
            DataType::TextArray => "text[]",
            DataType::IntArray => "int[]",
            DataType::NumberArray => "number[]",
            DataType::BooleanArray => "boolean[]",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Class
// =============================================================================

/// A declared property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    pub data_type: DataType,
}

impl Property {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Multi-tenancy settings of a class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTenancyConfig {
    pub enabled: bool,
    /// Property whose value names the tenant
    #[serde(default)]
    pub tenant_key: Option<String>,
}

impl MultiTenancyConfig {
    pub fn enabled(tenant_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            tenant_key: Some(tenant_key.into()),
        }
    }
}

/// A class definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    /// Unique class name
    #[serde(rename = "class")]
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub multi_tenancy_config: MultiTenancyConfig,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            multi_tenancy_config: MultiTenancyConfig::default(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.properties.push(Property::new(name, data_type));
        self
    }

    pub fn with_multi_tenancy(mut self, tenant_key: impl Into<String>) -> Self {
        self.multi_tenancy_config = MultiTenancyConfig::enabled(tenant_key);
        self
    }

    /// Whether objects of this class are partitioned by tenant
    pub fn is_multi_tenant(&self) -> bool {
        self.multi_tenancy_config.enabled
    }

    /// Tenant key property, only when multi-tenancy is enabled
    pub fn tenant_key(&self) -> Option<&str> {
        if self.is_multi_tenant() {
            self.multi_tenancy_config.tenant_key.as_deref()
        } else {
            None
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Validate name, properties and tenancy configuration
    pub fn validate(&self) -> Result<()> {
        if !self.name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return Err(Error::InvalidConfig(format!(
                "class name '{}' must start with an uppercase letter",
                self.name
            )));
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::InvalidConfig(format!(
                "class name '{}' may only contain letters, digits and underscores",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for property in &self.properties {
            if property.name.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "class {} declares a property with an empty name",
                    self.name
                )));
            }
            if !seen.insert(property.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "class {} declares property '{}' twice",
                    self.name, property.name
                )));
            }
        }

        if self.multi_tenancy_config.enabled {
            let key = match self.multi_tenancy_config.tenant_key.as_deref() {
                Some(key) if !key.is_empty() => key,
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "class {} enables multi-tenancy without a tenant key",
                        self.name
                    )))
                }
            };
            match self.property(key) {
                Some(p) if p.data_type.is_scalar_string() => {}
                Some(p) => {
                    return Err(Error::InvalidConfig(format!(
                        "tenant key '{}' of class {} has type {}, expected text or string",
                        key, self.name, p.data_type
                    )))
                }
                None => {
                    return Err(Error::InvalidConfig(format!(
                        "tenant key '{}' is not a property of class {}",
                        key, self.name
                    )))
                }
            }
        }

        Ok(())
    }

    /// Validate an object's properties against the declarations
    pub fn validate_properties(&self, properties: &Properties) -> Result<()> {
        for (name, value) in properties {
            let Some(property) = self.property(name) else {
                return Err(Error::InvalidObject(format!(
                    "property '{}' is not declared by class {}",
                    name, self.name
                )));
            };
            if !property.data_type.accepts(value) {
                return Err(Error::InvalidObject(format!(
                    "property '{}' of class {} expects {}, got {}",
                    name,
                    self.name,
                    property.data_type,
                    value.kind()
                )));
            }
        }
        Ok(())
    }
}
