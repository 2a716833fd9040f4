//! Object Model
//!
//! Objects are flexible property bags validated against their class at
//! write time. Values are a tagged union instead of untyped JSON so that
//! shards and the router can reason about them without re-parsing.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Object ID
// =============================================================================

/// Unique identifier for a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ObjectId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// Property Values
// =============================================================================

/// A single property value
///
/// Encoded as a plain JSON value. Integral numbers decode as `Int`,
/// fractional ones as `Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Int(i64),
    Number(f64),
    Text(String),
    BooleanArray(Vec<bool>),
    IntArray(Vec<i64>),
    NumberArray(Vec<f64>),
    TextArray(Vec<String>),
}

impl PropertyValue {
    /// Borrow the value as a scalar string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Int(_) => "int",
            PropertyValue::Number(_) => "number",
            PropertyValue::Text(_) => "text",
            PropertyValue::BooleanArray(_) => "boolean[]",
            PropertyValue::IntArray(_) => "int[]",
            PropertyValue::NumberArray(_) => "number[]",
            PropertyValue::TextArray(_) => "text[]",
        }
    }

    /// An empty JSON array decodes as `BooleanArray(vec![])`
    pub fn is_empty_array(&self) -> bool {
        matches!(self, PropertyValue::BooleanArray(v) if v.is_empty())
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

/// Insertion-ordered property bag
pub type Properties = IndexMap<String, PropertyValue>;

// =============================================================================
// Objects
// =============================================================================

/// An object as submitted by a client, before routing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewObject {
    /// Caller-chosen identifier; generated when absent
    #[serde(default)]
    pub id: Option<ObjectId>,
    /// Explicit tenant, must agree with the tenant key property
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl NewObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }
}

/// An object as held by a shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub id: ObjectId,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub properties: Properties,
    /// Creation time (Unix millis)
    pub creation_time_unix: i64,
    /// Last update time (Unix millis)
    pub last_update_time_unix: i64,
}

impl StorageObject {
    /// Build a storage object stamped with the current time
    pub fn new(id: ObjectId, class: impl Into<String>, tenant: Option<String>, properties: Properties) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id,
            class: class.into(),
            tenant,
            properties,
            creation_time_unix: now,
            last_update_time_unix: now,
        }
    }

    /// Look up a property value
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_json_decoding() {
        let props: Properties = serde_json::from_str(
            r#"{"name": "Tenant1", "count": 3, "ratio": 0.5, "ok": true, "tags": ["a", "b"], "empty": []}"#,
        )
        .unwrap();

        assert_eq!(props["name"], PropertyValue::Text("Tenant1".into()));
        assert_eq!(props["count"], PropertyValue::Int(3));
        assert_eq!(props["ratio"], PropertyValue::Number(0.5));
        assert_eq!(props["ok"], PropertyValue::Boolean(true));
        assert_eq!(props["tags"], PropertyValue::TextArray(vec!["a".into(), "b".into()]));
        assert!(props["empty"].is_empty_array());

        // Insertion order survives
        let keys: Vec<_> = props.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "count", "ratio", "ok", "tags", "empty"]);
    }

    #[test]
    fn test_object_id_parse_and_display() {
        let id = ObjectId::generate();
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_new_object_builder() {
        let obj = NewObject::new()
            .with_property("tenantName", "Tenant1")
            .with_tenant("Tenant1");
        assert_eq!(obj.tenant.as_deref(), Some("Tenant1"));
        assert_eq!(obj.properties["tenantName"].as_text(), Some("Tenant1"));
    }
}
