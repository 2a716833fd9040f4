//! Tenant Store - Multi-Tenant Object Storage
//!
//! A clustered object store in which every tenant of a class owns its own
//! shard on exactly one node. Writes are routed to the owning shard by the
//! value of the class's tenant key property, and cluster status merges the
//! per-shard object counts of every node into one report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          REST / Internal API                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                             Coordinator                                  │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────┐  ┌─────────────┐  │
//! │  │   Schema     │  │ Tenant Directory │  │  Router  │  │   Cluster   │  │
//! │  │   Registry   │  │   + Placement    │  │          │  │   Status    │  │
//! │  └──────────────┘  └────────┬─────────┘  └────┬─────┘  └──────┬──────┘  │
//! │                             └────────────┬────┴───────────────┘         │
//! │                                  ┌───────┴────────┐                     │
//! │                                  │ Node Clients   │  Membership         │
//! │                                  │ (local / HTTP) │  (NodeRegistry)     │
//! │                                  └───────┬────────┘                     │
//! ├──────────────────────────────────────────┼──────────────────────────────┤
//! │              Local Shard Store           │      Peer nodes              │
//! │   ┌────────┐ ┌────────┐ ┌────────┐       └──────► /internal/...         │
//! │   │Tenant1 │ │Tenant2 │ │Tenant3 │                                      │
//! │   └────────┘ └────────┘ └────────┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`schema`]: Class definitions and the schema registry
//! - [`shard`]: Tenant-owned shards and the per-node shard store
//! - [`tenancy`]: Tenant directory and shard placement
//! - [`router`]: Object write and read routing
//! - [`cluster`]: Membership, node clients and status aggregation
//! - [`coordinator`]: Facade wiring the components of one node
//! - [`api`]: REST and internal HTTP routes
//! - [`domain`]: Object model and ports
//! - [`error`]: Error types and handling

pub mod api;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod router;
pub mod schema;
pub mod shard;
pub mod tenancy;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use cluster::{
    CallOptions, ClusterStatus, ClusterStatusAggregator, HttpNodeClient, LocalNodeClient,
    NodeClientPool, NodeRegistry, StatusFailurePolicy,
};

pub use config::StoreConfig;
pub use coordinator::Coordinator;

pub use domain::{
    Membership, NewObject, NodeClient, NodeInfo, NodeStatus, ObjectId, Properties, PropertyValue,
    ShardSpec, ShardStatus, StorageObject,
};

pub use error::{Error, ErrorBody, Result};
pub use metrics::StoreMetrics;
pub use router::Router;
pub use schema::{Class, DataType, MultiTenancyConfig, Property, SchemaRegistry};
pub use shard::{LocalShardStore, Shard};

pub use tenancy::{
    PlacementPolicy, TenantDirectory, TenantEntry, TenantEvent, TenantOutcome, TenantState,
    DEFAULT_SHARD,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
