//! Error types for the tenant store
//!
//! Provides one structured error type shared by the schema registry,
//! tenant directory, shards, router and cluster status aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Unified error type for the store
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Schema / Directory Errors
    // =========================================================================
    #[error("{kind} already exists: {name}")]
    Conflict { kind: String, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Invalid multi-tenancy configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    // =========================================================================
    // Tenancy Errors
    // =========================================================================
    #[error("Tenant mismatch: shard belongs to tenant {expected}, object carries {actual:?}")]
    TenantMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("Class {class} requires a value for tenant key property {tenant_key}")]
    MissingTenantValue { class: String, tenant_key: String },

    #[error("Multi-tenancy is not enabled for class {class}")]
    TenancyNotEnabled { class: String },

    // =========================================================================
    // Shard Errors
    // =========================================================================
    #[error("Shard {class}/{shard} has been deleted")]
    ShardGone { class: String, shard: String },

    // =========================================================================
    // Cluster Errors
    // =========================================================================
    #[error("Routing to node {node} failed: {reason}")]
    Routing { node: String, reason: String },

    #[error("Cluster status incomplete, unresponsive nodes: {}", nodes.join(", "))]
    PartialClusterFailure { nodes: Vec<String> },

    #[error("Operation cancelled")]
    Cancelled,

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(kind: &str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    pub fn conflict(kind: &str, name: impl Into<String>) -> Self {
        Error::Conflict {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    pub fn routing(node: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Routing {
            node: node.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::Conflict { .. } => "conflict",
            Error::NotFound { .. } => "not_found",
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidObject(_) => "invalid_object",
            Error::TenantMismatch { .. } => "tenant_mismatch",
            Error::MissingTenantValue { .. } => "missing_tenant_value",
            Error::TenancyNotEnabled { .. } => "tenancy_not_enabled",
            Error::ShardGone { .. } => "shard_gone",
            Error::Routing { .. } => "routing_error",
            Error::PartialClusterFailure { .. } => "partial_cluster_failure",
            Error::Cancelled => "cancelled",
            Error::Configuration(_) | Error::YamlParse(_) => "configuration_error",
            Error::JsonParse(_) => "invalid_json",
            Error::Internal(_) | Error::Io(_) => "internal_error",
        }
    }

    /// Errors raised by validating a request against the schema or a shard
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Conflict { .. }
                | Error::InvalidConfig(_)
                | Error::InvalidObject(_)
                | Error::TenantMismatch { .. }
                | Error::MissingTenantValue { .. }
                | Error::TenancyNotEnabled { .. }
        )
    }

    /// Check if this error is transient
    ///
    /// The store never retries these itself; an outer layer may.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Routing { .. } | Error::PartialClusterFailure { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Error::Cancelled)
    }
}

/// Result type alias for the store
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Wire Representation
// =============================================================================

/// JSON error body shared by the REST API and the node-to-node client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        let mut details = BTreeMap::new();
        let mut nodes = Vec::new();
        let mut put = |k: &str, v: &str| {
            details.insert(k.to_string(), v.to_string());
        };

        match err {
            Error::Conflict { kind, name } | Error::NotFound { kind, name } => {
                put("kind", kind);
                put("name", name);
            }
            Error::InvalidConfig(reason) | Error::InvalidObject(reason) => put("reason", reason),
            Error::TenantMismatch { expected, actual } => {
                put("expected", expected);
                if let Some(actual) = actual {
                    put("actual", actual);
                }
            }
            Error::MissingTenantValue { class, tenant_key } => {
                put("class", class);
                put("tenantKey", tenant_key);
            }
            Error::TenancyNotEnabled { class } => put("class", class),
            Error::ShardGone { class, shard } => {
                put("class", class);
                put("shard", shard);
            }
            Error::Routing { node, reason } => {
                put("node", node);
                put("reason", reason);
            }
            Error::PartialClusterFailure { nodes: unreachable } => nodes = unreachable.clone(),
            _ => {}
        }

        Self {
            error: err.code().to_string(),
            message: err.to_string(),
            details,
            nodes,
        }
    }
}

impl From<ErrorBody> for Error {
    fn from(body: ErrorBody) -> Self {
        let ErrorBody {
            error,
            message,
            mut details,
            nodes,
        } = body;
        let mut take = |k: &str| details.remove(k).unwrap_or_default();

        match error.as_str() {
            "conflict" => Error::Conflict {
                kind: take("kind"),
                name: take("name"),
            },
            "not_found" => Error::NotFound {
                kind: take("kind"),
                name: take("name"),
            },
            "invalid_config" => Error::InvalidConfig(take("reason")),
            "invalid_object" => Error::InvalidObject(take("reason")),
            "tenant_mismatch" => {
                let expected = take("expected");
                let actual = Some(take("actual")).filter(|a| !a.is_empty());
                Error::TenantMismatch { expected, actual }
            }
            "missing_tenant_value" => Error::MissingTenantValue {
                class: take("class"),
                tenant_key: take("tenantKey"),
            },
            "tenancy_not_enabled" => Error::TenancyNotEnabled {
                class: take("class"),
            },
            "shard_gone" => Error::ShardGone {
                class: take("class"),
                shard: take("shard"),
            },
            "routing_error" => Error::Routing {
                node: take("node"),
                reason: take("reason"),
            },
            "partial_cluster_failure" => Error::PartialClusterFailure { nodes },
            "cancelled" => Error::Cancelled,
            "configuration_error" => Error::Configuration(message),
            _ => Error::Internal(message),
        }
    }
}
