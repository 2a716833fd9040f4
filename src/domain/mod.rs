//! Domain layer - Core object model and port definitions
//!
//! This module defines the object model shared by every component and the
//! traits (ports) that local and remote node adapters implement.

pub mod object;
pub mod ports;

pub use object::*;
pub use ports::*;
