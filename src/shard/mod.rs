//! Shard Module
//!
//! Tenant-owned object partitions and the per-node store that holds them.

pub mod partition;
pub mod store;

pub use partition::*;
pub use store::*;
