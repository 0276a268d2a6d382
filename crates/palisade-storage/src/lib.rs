//! # palisade-storage
//!
//! Backing-store contract for Palisade ACL resolution.
//!
//! This crate provides:
//! - [`AclStore`]: the batch-read and children-by-parent contract
//! - [`AclRow`] / [`AceRow`]: stored rows with a fixed field contract
//! - [`MemoryStore`]: an in-memory store for tests and embedded use
//!
//! Any medium that can answer the two queries of [`AclStore`] is
//! interchangeable with any other.

#![forbid(unsafe_code)]

pub mod memory;
pub mod row;
pub mod traits;

pub use memory::MemoryStore;
pub use row::{AceRow, AclRow, decode_rows};
pub use traits::{AclStore, BatchQuery};
