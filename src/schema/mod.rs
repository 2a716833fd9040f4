//! Schema Module
//!
//! Class definitions and the registry that owns them.

pub mod class;
pub mod registry;

pub use class::*;
pub use registry::*;
