//! Palisade Core: identity types, the Acl entity, errors, and configuration.
//!
//! This crate has no internal Palisade dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`types`]: `ObjectIdentity`, `Sid`, `AccessControlEntry`
//! - [`acl`]: the resolved `Acl` and its inheritance traversal
//! - [`error`]: Error types and Result alias
//! - [`config`]: lookup and cache settings

#![forbid(unsafe_code)]

pub mod acl;
pub mod config;
pub mod error;
pub mod types;

// Re-export key types at crate root for convenience
pub use acl::{Acl, Ancestors};
pub use config::{AclConfig, CacheConfig, LookupConfig};
pub use error::{Error, Result};
pub use types::{AccessControlEntry, ObjectIdentity, Sid};
