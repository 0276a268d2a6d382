//! The public ACL service.
//!
//! [`AclService`] is what an authorization layer talks to. It delegates
//! resolution to a [`LookupStrategy`] and turns "absent from the result"
//! into [`Error::NotFound`], so a missing ACL is never mistaken for an empty
//! one.
//!
//! # Example
//!
//! ```rust,ignore
//! use palisade_acl::AclService;
//!
//! let service = AclService::from_config(store, &config)?;
//! let acl = service.read_acl(&ObjectIdentity::new("Document", 5)).await?;
//! if acl.is_granted(&[READ], &[Sid::principal("alice")], false)? {
//!     // ...
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use palisade_core::config::DEFAULT_STORE_TIMEOUT_MS;
use palisade_core::{Acl, AclConfig, Error, ObjectIdentity, Result, Sid};
use palisade_storage::AclStore;

use crate::lookup::{BasicLookupStrategy, LookupStrategy, with_timeout};

/// Facade over ACL lookup and child listing.
#[derive(Clone)]
pub struct AclService {
    store: Arc<dyn AclStore>,
    lookup: Arc<dyn LookupStrategy>,
    store_timeout: Duration,
}

impl AclService {
    /// Creates a service from a store and a lookup strategy.
    pub fn new(store: Arc<dyn AclStore>, lookup: Arc<dyn LookupStrategy>) -> Self {
        Self {
            store,
            lookup,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// Creates a service with a [`BasicLookupStrategy`] configured from
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    pub fn from_config(store: Arc<dyn AclStore>, config: &AclConfig) -> Result<Self> {
        let lookup = Arc::new(BasicLookupStrategy::new(Arc::clone(&store), config)?);
        Ok(Self::new(store, lookup).with_store_timeout(config.lookup.store_timeout()))
    }

    /// Sets the timeout applied to direct store queries.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Lists the direct children of `parent`.
    ///
    /// Reads the store directly; child lists are not cached. The result is
    /// ordered by `(object_type, identifier)` and is empty when `parent` has
    /// no children.
    pub async fn find_children(&self, parent: &ObjectIdentity) -> Result<Vec<ObjectIdentity>> {
        let mut children =
            with_timeout(self.store_timeout, self.store.find_children(parent)).await?;
        children.sort();
        children.dedup();
        log::debug!("{parent} has {} children", children.len());
        Ok(children)
    }

    /// Resolves one identity.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the identity has no stored ACL, plus anything
    /// [`read_acls_by_id`](Self::read_acls_by_id) can return.
    pub async fn read_acl_by_id(
        &self,
        object: &ObjectIdentity,
        sids: Option<&[Sid]>,
    ) -> Result<Arc<Acl>> {
        let mut acls = self.read_acls_by_id(std::slice::from_ref(object), sids).await?;
        acls.remove(object).ok_or_else(|| Error::not_found(object))
    }

    /// Resolves one identity with every entry loaded.
    pub async fn read_acl(&self, object: &ObjectIdentity) -> Result<Arc<Acl>> {
        self.read_acl_by_id(object, None).await
    }

    /// Resolves a batch of identities.
    ///
    /// Either every requested identity is in the returned map or the call
    /// fails; there is no partial success.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] naming the first identity, in request order,
    ///   that has no stored ACL.
    /// - [`Error::Validation`] for an empty request.
    /// - [`Error::DepthExceeded`], [`Error::Timeout`],
    ///   [`Error::BackingStoreUnavailable`], or [`Error::LoadAbandoned`]
    ///   from the lookup.
    pub async fn read_acls_by_id(
        &self,
        objects: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<HashMap<ObjectIdentity, Arc<Acl>>> {
        let result = self.lookup.read_acls_by_id(objects, sids).await?;

        if let Some(missing) = objects.iter().find(|oid| !result.contains_key(*oid)) {
            log::debug!("No ACL for {missing}");
            return Err(Error::not_found(missing));
        }

        Ok(result)
    }

    /// Resolves a batch of identities with every entry loaded.
    pub async fn read_acls(
        &self,
        objects: &[ObjectIdentity],
    ) -> Result<HashMap<ObjectIdentity, Arc<Acl>>> {
        self.read_acls_by_id(objects, None).await
    }

    /// Signals that the stored rows for `object` changed.
    ///
    /// Must be called by the write path after every mutation.
    pub fn invalidate(&self, object: &ObjectIdentity) {
        self.lookup.invalidate(object);
    }
}

impl std::fmt::Debug for AclService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclService")
            .field("store", &self.store.name())
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
