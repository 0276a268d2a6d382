//! Object identities: the keys ACLs are stored and cached under.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Identity of a protected domain object.
///
/// Two identities are equal when both the type and the identifier match.
/// Ordering is by type first, then identifier, which gives child listings
/// a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentity {
    object_type: String,
    identifier: i64,
}

impl ObjectIdentity {
    /// Creates an identity from a type name and a numeric identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use palisade_core::ObjectIdentity;
    ///
    /// let oid = ObjectIdentity::new("Document", 5);
    /// assert_eq!(oid.object_type(), "Document");
    /// assert_eq!(oid.identifier(), 5);
    /// assert_eq!(oid.to_string(), "Document:5");
    /// ```
    pub fn new<S: Into<String>>(object_type: S, identifier: i64) -> Self {
        Self {
            object_type: object_type.into(),
            identifier,
        }
    }

    /// Returns the domain type name.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Returns the numeric identifier.
    pub fn identifier(&self) -> i64 {
        self.identifier
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.identifier)
    }
}

impl std::str::FromStr for ObjectIdentity {
    type Err = Error;

    /// Parses the `Type:identifier` form produced by `Display`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (object_type, identifier) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::validation(format!("'{s}' is not of the form Type:id")))?;
        if object_type.is_empty() {
            return Err(Error::validation(format!("'{s}' has an empty type")));
        }
        let identifier = identifier
            .parse::<i64>()
            .map_err(|e| Error::validation(format!("'{s}' has a bad identifier: {e}")))?;
        Ok(Self::new(object_type, identifier))
    }
}
