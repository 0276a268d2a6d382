//! Access control entries.

use serde::{Deserialize, Serialize};

use super::Sid;

/// One grant or deny rule for one sid.
///
/// Entries are owned by exactly one [`Acl`](crate::Acl) and are only
/// reachable through it. Their position inside the Acl is their precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    id: Option<i64>,
    sid: Sid,
    mask: u32,
    granting: bool,
    audit_success: bool,
    audit_failure: bool,
}

impl AccessControlEntry {
    /// Creates an entry with auditing disabled.
    pub fn new(sid: Sid, mask: u32, granting: bool) -> Self {
        Self {
            id: None,
            sid,
            mask,
            granting,
            audit_success: false,
            audit_failure: false,
        }
    }

    /// Creates a granting entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use palisade_core::{AccessControlEntry, Sid};
    ///
    /// let ace = AccessControlEntry::grant(Sid::principal("admin"), 7);
    /// assert!(ace.is_granting());
    /// assert!(ace.applies_to(&Sid::principal("admin"), 7));
    /// ```
    pub fn grant(sid: Sid, mask: u32) -> Self {
        Self::new(sid, mask, true)
    }

    /// Creates a denying entry.
    pub fn deny(sid: Sid, mask: u32) -> Self {
        Self::new(sid, mask, false)
    }

    /// Sets the store-assigned entry id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the audit flags.
    pub fn with_audit(mut self, audit_success: bool, audit_failure: bool) -> Self {
        self.audit_success = audit_success;
        self.audit_failure = audit_failure;
        self
    }

    /// Store-assigned entry id, if the store has one.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// The sid this entry applies to.
    pub fn sid(&self) -> &Sid {
        &self.sid
    }

    /// The permission bitmask.
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// `true` for grants, `false` for denials.
    pub fn is_granting(&self) -> bool {
        self.granting
    }

    /// Whether a successful check through this entry should be audited.
    pub fn is_audit_success(&self) -> bool {
        self.audit_success
    }

    /// Whether a rejected check through this entry should be audited.
    pub fn is_audit_failure(&self) -> bool {
        self.audit_failure
    }

    /// Returns `true` when this entry is for `sid` and carries exactly `mask`.
    pub fn applies_to(&self, sid: &Sid, mask: u32) -> bool {
        self.mask == mask && &self.sid == sid
    }
}
