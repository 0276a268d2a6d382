//! Security identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A security identity: who an access control entry applies to.
///
/// Equality considers both the variant and the name, so a principal named
/// `admin` is a different sid from an authority named `admin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sid {
    /// An authenticated principal, identified by name.
    Principal(String),
    /// A granted authority or role, identified by name.
    GrantedAuthority(String),
}

impl Sid {
    /// Creates a principal sid.
    pub fn principal<S: Into<String>>(name: S) -> Self {
        Sid::Principal(name.into())
    }

    /// Creates a granted-authority sid.
    pub fn authority<S: Into<String>>(name: S) -> Self {
        Sid::GrantedAuthority(name.into())
    }

    /// Returns the name regardless of variant.
    pub fn name(&self) -> &str {
        match self {
            Sid::Principal(name) | Sid::GrantedAuthority(name) => name,
        }
    }

    /// Returns `true` for principal sids.
    pub fn is_principal(&self) -> bool {
        matches!(self, Sid::Principal(_))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sid::Principal(name) => write!(f, "principal:{name}"),
            Sid::GrantedAuthority(name) => write!(f, "authority:{name}"),
        }
    }
}
