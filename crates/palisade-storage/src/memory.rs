//! In-memory ACL store.
//!
//! Holds rows in a sorted map, so child listings come back ordered by
//! `(object_type, identifier)`. Useful for tests, fixtures, and small
//! deployments that load ACLs from a file at startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use palisade_core::{Error, ObjectIdentity, Result};

use crate::row::{AclRow, decode_rows};
use crate::traits::{AclStore, BatchQuery};

/// An [`AclStore`] backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<ObjectIdentity, AclRow>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `rows`. Later rows replace earlier ones with
    /// the same identity.
    pub fn from_rows<I: IntoIterator<Item = AclRow>>(rows: I) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| (row.object_identity.clone(), row))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Creates a store from a JSON array of rows.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::from_rows(decode_rows(json)?))
    }

    /// Creates a store from a JSON file of rows.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let store = Self::from_json(&content)?;
        log::debug!("Loaded {} ACL rows from {}", store.len(), path.display());
        Ok(store)
    }

    /// Inserts or replaces a row, returning the previous one.
    ///
    /// Callers holding a cache in front of this store must invalidate the
    /// row's identity afterwards.
    pub fn insert(&self, row: AclRow) -> Result<Option<AclRow>> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        Ok(rows.insert(row.object_identity.clone(), row))
    }

    /// Removes a row, returning it if it existed.
    pub fn remove(&self, object: &ObjectIdentity) -> Result<Option<AclRow>> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        Ok(rows.remove(object))
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Error {
    Error::unavailable("memory store lock poisoned")
}

#[async_trait]
impl AclStore for MemoryStore {
    async fn read_batch(&self, query: &BatchQuery) -> Result<Vec<AclRow>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let found = query
            .identities
            .iter()
            .filter_map(|oid| rows.get(oid))
            .map(|row| {
                let mut row = row.clone();
                if let Some(sids) = &query.sids {
                    row.retain_sids(sids);
                }
                row
            })
            .collect();
        Ok(found)
    }

    async fn find_children(&self, parent: &ObjectIdentity) -> Result<Vec<ObjectIdentity>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .values()
            .filter(|row| row.parent.as_ref() == Some(parent))
            .map(|row| row.object_identity.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
