//! The resolved Acl entity and its permission traversal.
//!
//! An [`Acl`] is immutable once built. Its parent is shared through an
//! [`Arc`], and parents are always constructed before their children, so a
//! chain of parents is a finite tree path that ends at a root.
//!
//! # Traversal
//!
//! [`Acl::is_granted`] walks an Acl's own entries first. The first entry
//! matching a requested `(mask, sid)` pair decides the outcome. Only when no
//! local entry matches, and the Acl inherits entries, is the parent consulted.
//! Traversal stops at the first Acl that does not inherit or has no parent.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{AccessControlEntry, ObjectIdentity, Sid};

/// A fully resolved ACL for one object identity.
#[derive(Debug, Clone)]
pub struct Acl {
    object_identity: ObjectIdentity,
    owner: Sid,
    parent: Option<Arc<Acl>>,
    entries_inheriting: bool,
    entries: Vec<AccessControlEntry>,
    loaded_sids: Option<Vec<Sid>>,
}

impl Acl {
    /// Creates an Acl with no parent, no entries, and inheritance enabled.
    pub fn new(object_identity: ObjectIdentity, owner: Sid) -> Self {
        Self {
            object_identity,
            owner,
            parent: None,
            entries_inheriting: true,
            entries: Vec::new(),
            loaded_sids: None,
        }
    }

    /// Sets the parent Acl.
    pub fn with_parent(mut self, parent: Arc<Acl>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets whether the parent's entries are consulted.
    pub fn with_entries_inheriting(mut self, inheriting: bool) -> Self {
        self.entries_inheriting = inheriting;
        self
    }

    /// Sets the entries, in precedence order.
    pub fn with_entries(mut self, entries: Vec<AccessControlEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Records which sids the entries were loaded for.
    ///
    /// `None` means entries for every sid were loaded.
    pub fn with_loaded_sids(mut self, sids: Option<Vec<Sid>>) -> Self {
        self.loaded_sids = sids;
        self
    }

    /// The object this Acl protects.
    pub fn object_identity(&self) -> &ObjectIdentity {
        &self.object_identity
    }

    /// The owner of the protected object.
    pub fn owner(&self) -> &Sid {
        &self.owner
    }

    /// The parent Acl, if any.
    pub fn parent(&self) -> Option<&Arc<Acl>> {
        self.parent.as_ref()
    }

    /// Whether the parent's entries apply when no local entry matches.
    pub fn is_entries_inheriting(&self) -> bool {
        self.entries_inheriting
    }

    /// Local entries in precedence order. Inherited entries are not included.
    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    /// The sids this Acl was loaded for, or `None` if it was fully loaded.
    pub fn loaded_sids(&self) -> Option<&[Sid]> {
        self.loaded_sids.as_deref()
    }

    /// Iterates over the ancestors, nearest first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.parent.as_deref(),
        }
    }

    /// Number of parent links between this Acl and its root.
    pub fn parent_hops(&self) -> usize {
        self.ancestors().count()
    }

    /// Returns `true` if this Acl holds every entry relevant to `sids`.
    ///
    /// Entries that were filtered out at load time are "not loaded", never
    /// "denied"; callers must reload before evaluating such sids.
    pub fn is_sid_loaded(&self, sids: &[Sid]) -> bool {
        match &self.loaded_sids {
            None => true,
            Some(loaded) => sids.iter().all(|sid| loaded.contains(sid)),
        }
    }

    /// Decides whether any of `sids` holds any of `masks`.
    ///
    /// Masks are tried in order and, for each mask, sids in order. The first
    /// entry matching a pair decides that pair. A grant ends the evaluation
    /// with `true`; a denial is remembered and the next pair is tried. If
    /// only denials matched, the result is `false`.
    ///
    /// When nothing matched locally and entries are inherited, the parent is
    /// evaluated the same way.
    ///
    /// Audit logging is suppressed in `administrative_mode`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnloadedSid`] if an Acl on the path was not loaded for
    ///   one of `sids`.
    /// - [`Error::NoApplicableEntry`] if no entry matched anywhere on the path.
    pub fn is_granted(
        &self,
        masks: &[u32],
        sids: &[Sid],
        administrative_mode: bool,
    ) -> Result<bool> {
        let mut current = self;
        loop {
            current.ensure_sids_loaded(sids)?;

            if let Some(decision) = current.evaluate_local(masks, sids, administrative_mode) {
                return Ok(decision);
            }

            match (current.entries_inheriting, current.parent.as_deref()) {
                (true, Some(parent)) => current = parent,
                _ => {
                    return Err(Error::NoApplicableEntry {
                        object: self.object_identity.clone(),
                    });
                }
            }
        }
    }

    fn ensure_sids_loaded(&self, sids: &[Sid]) -> Result<()> {
        if let Some(loaded) = &self.loaded_sids
            && let Some(missing) = sids.iter().find(|sid| !loaded.contains(sid))
        {
            return Err(Error::UnloadedSid {
                sid: missing.clone(),
            });
        }
        Ok(())
    }

    fn evaluate_local(
        &self,
        masks: &[u32],
        sids: &[Sid],
        administrative_mode: bool,
    ) -> Option<bool> {
        let mut first_rejection: Option<&AccessControlEntry> = None;

        for &mask in masks {
            for sid in sids {
                let Some(ace) = self.entries.iter().find(|ace| ace.applies_to(sid, mask)) else {
                    continue;
                };

                if ace.is_granting() {
                    if !administrative_mode && ace.is_audit_success() {
                        log::info!(
                            "GRANTED due to ACE for {} mask {} on {}",
                            ace.sid(),
                            ace.mask(),
                            self.object_identity
                        );
                    }
                    return Some(true);
                }

                if first_rejection.is_none() {
                    first_rejection = Some(ace);
                }
            }
        }

        first_rejection.map(|ace| {
            if !administrative_mode && ace.is_audit_failure() {
                log::info!(
                    "DENIED due to ACE for {} mask {} on {}",
                    ace.sid(),
                    ace.mask(),
                    self.object_identity
                );
            }
            false
        })
    }
}

/// Iterator over an Acl's ancestors, nearest first.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    next: Option<&'a Acl>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Acl;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

// ============================================================================
// Tests
// ============================================================================
