//! # palisade-acl
//!
//! Hierarchy-aware ACL resolution for Palisade.
//!
//! This crate implements:
//! - [`AclService`]: the facade (batch/single reads, child listing,
//!   invalidation)
//! - [`LookupStrategy`] / [`BasicLookupStrategy`]: batched, level-by-level
//!   resolution of Acls and their ancestors
//! - [`AclCache`]: concurrent cache with per-key fill deduplication and
//!   generation-checked invalidation

#![forbid(unsafe_code)]

mod assembly;
pub mod cache;
pub mod lookup;
pub mod service;

pub use cache::AclCache;
pub use lookup::{BasicLookupStrategy, LookupStrategy};
pub use service::AclService;

pub use palisade_core::{
    AccessControlEntry, Acl, AclConfig, Error, ObjectIdentity, Result, Sid,
};
pub use palisade_storage::{AceRow, AclRow, AclStore, BatchQuery, MemoryStore};
