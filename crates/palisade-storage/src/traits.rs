//! The backing-store trait.

use async_trait::async_trait;
use palisade_core::{ObjectIdentity, Result, Sid};

use crate::row::AclRow;

/// One batched read request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchQuery {
    /// Identities whose rows are wanted. Distinct, in no particular order.
    pub identities: Vec<ObjectIdentity>,
    /// Optional hint: stores may omit entries for other sids.
    pub sids: Option<Vec<Sid>>,
}

impl BatchQuery {
    /// Creates a batch query.
    pub fn new(identities: Vec<ObjectIdentity>, sids: Option<Vec<Sid>>) -> Self {
        Self { identities, sids }
    }
}

/// Persistence contract for ACL rows.
///
/// # Async
///
/// Store calls are the only operations in Palisade that may suspend. They
/// may be slow or fail transiently; implementations report transient
/// failures as [`Error::BackingStoreUnavailable`](palisade_core::Error).
#[async_trait]
pub trait AclStore: Send + Sync {
    /// Reads the rows for a batch of identities.
    ///
    /// Identities without a row are left out of the result; that is not an
    /// error. Each row's entries must be in precedence order.
    async fn read_batch(&self, query: &BatchQuery) -> Result<Vec<AclRow>>;

    /// Lists the identities whose stored parent is `parent`.
    ///
    /// Returns an empty vector when there are none.
    async fn find_children(&self, parent: &ObjectIdentity) -> Result<Vec<ObjectIdentity>>;

    /// Store name for diagnostics.
    fn name(&self) -> &str;
}
