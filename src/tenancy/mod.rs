//! Tenancy Module
//!
//! Tenant to shard ownership: placement of new shards, the directory that
//! records them, and the events it emits.

pub mod directory;
pub mod events;
pub mod placement;

pub use directory::*;
pub use events::*;
pub use placement::*;
