//! Cluster Module
//!
//! Membership, node-to-node clients and cluster-wide status aggregation.

pub mod client;
pub mod membership;
pub mod status;

pub use client::*;
pub use membership::*;
pub use status::*;
