//! Keeper Common - Shared path helpers and utilities
//!
//! This crate provides the pieces used across Keeper components:
//! - Hierarchical path algebra (segments, prefixes, parent, join)
//! - Path validation errors
//! - Local address helpers for registration payloads

pub mod path;
pub mod utils;

// Re-exports for convenience
pub use path::{PathError, base_name, join, normalize, parent, prefixes, segments};
pub use utils::{local_ip, node_address};

/// Path separator and name of the root node
pub const ROOT: &str = "/";

/// Default ZooKeeper client port
pub const DEFAULT_PORT: u16 = 2181;
