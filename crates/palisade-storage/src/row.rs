//! Stored row types and their decoding.
//!
//! Rows have a fixed field contract. A JSON document of rows looks like:
//!
//! ```json
//! [
//!   {
//!     "object_identity": { "object_type": "Folder", "identifier": 1 },
//!     "owner": { "principal": "admin" },
//!     "entries": [
//!       { "sid": { "principal": "admin" }, "mask": 7, "granting": true }
//!     ]
//!   },
//!   {
//!     "object_identity": { "object_type": "Document", "identifier": 5 },
//!     "parent": { "object_type": "Folder", "identifier": 1 },
//!     "owner": { "principal": "admin" }
//!   }
//! ]
//! ```
//!
//! `parent`, `entries`, `id`, and the audit flags are optional;
//! `entries_inheriting` defaults to `true`.

use palisade_core::{AccessControlEntry, Error, ObjectIdentity, Result, Sid};
use serde::{Deserialize, Serialize};

/// One stored ACL: the object, its parent link, and its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRow {
    /// The protected object.
    pub object_identity: ObjectIdentity,

    /// Parent object, if the ACL participates in a hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectIdentity>,

    /// Owner of the object.
    pub owner: Sid,

    /// Whether the parent's entries apply.
    #[serde(default = "default_inheriting")]
    pub entries_inheriting: bool,

    /// Entries in precedence order.
    #[serde(default)]
    pub entries: Vec<AceRow>,
}

/// One stored access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceRow {
    /// Store-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Sid the entry applies to.
    pub sid: Sid,
    /// Permission bitmask.
    pub mask: u32,
    /// Grant (`true`) or deny (`false`).
    pub granting: bool,
    /// Audit successful checks.
    #[serde(default)]
    pub audit_success: bool,
    /// Audit rejected checks.
    #[serde(default)]
    pub audit_failure: bool,
}

fn default_inheriting() -> bool {
    true
}

impl AclRow {
    /// Creates a root row with no entries.
    pub fn new(object_identity: ObjectIdentity, owner: Sid) -> Self {
        Self {
            object_identity,
            parent: None,
            owner,
            entries_inheriting: true,
            entries: Vec::new(),
        }
    }

    /// Sets the parent link.
    pub fn with_parent(mut self, parent: ObjectIdentity) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the inheritance flag.
    pub fn with_entries_inheriting(mut self, inheriting: bool) -> Self {
        self.entries_inheriting = inheriting;
        self
    }

    /// Appends an entry.
    pub fn with_entry(mut self, entry: AceRow) -> Self {
        self.entries.push(entry);
        self
    }

    /// Keeps only the entries for `sids`, preserving order.
    pub fn retain_sids(&mut self, sids: &[Sid]) {
        self.entries.retain(|ace| sids.contains(&ace.sid));
    }

    /// Converts the stored entries into domain entries.
    pub fn access_control_entries(&self) -> Vec<AccessControlEntry> {
        self.entries.iter().map(AccessControlEntry::from).collect()
    }
}

impl AceRow {
    /// Creates a granting entry row.
    pub fn grant(sid: Sid, mask: u32) -> Self {
        Self {
            id: None,
            sid,
            mask,
            granting: true,
            audit_success: false,
            audit_failure: false,
        }
    }

    /// Creates a denying entry row.
    pub fn deny(sid: Sid, mask: u32) -> Self {
        Self {
            granting: false,
            ..Self::grant(sid, mask)
        }
    }
}

impl From<&AceRow> for AccessControlEntry {
    fn from(row: &AceRow) -> Self {
        let entry = AccessControlEntry::new(row.sid.clone(), row.mask, row.granting)
            .with_audit(row.audit_success, row.audit_failure);
        match row.id {
            Some(id) => entry.with_id(id),
            None => entry,
        }
    }
}

/// Decodes a JSON array of rows.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the document does not match the row
/// contract.
pub fn decode_rows(json: &str) -> Result<Vec<AclRow>> {
    serde_json::from_str(json).map_err(|e| Error::validation(format!("Malformed ACL rows: {e}")))
}
