//! Error types for palisade-core

use crate::types::{ObjectIdentity, Sid};

/// Result type alias for Palisade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or evaluating ACLs.
///
/// Errors are `Clone` so that a single failed load can be handed to every
/// caller waiting on the same in-flight resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A requested object identity has no ACL in the backing store.
    #[error("Unable to find ACL information for object identity '{object}'")]
    NotFound {
        /// The identity that could not be resolved
        object: ObjectIdentity,
    },

    /// The ancestor chain of an object exceeded the configured depth, or
    /// looped back on itself.
    #[error("Ancestor chain of '{object}' exceeds maximum depth of {max_depth}")]
    DepthExceeded {
        /// The identity whose chain could not be resolved
        object: ObjectIdentity,
        /// Configured maximum number of parent hops
        max_depth: usize,
    },

    /// The backing store could not serve the request.
    #[error("Backing store unavailable: {message}")]
    BackingStoreUnavailable {
        /// Description reported by the store
        message: String,
    },

    /// A backing-store call did not complete in time.
    #[error("Backing store call timed out after {millis}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds
        millis: u64,
    },

    /// The task loading this identity stopped before publishing a result.
    #[error("Load of '{object}' was abandoned before completion")]
    LoadAbandoned {
        /// The identity that was being loaded
        object: ObjectIdentity,
    },

    /// A permission check named a sid the Acl was not loaded for.
    #[error("Acl was not loaded for sid '{sid}'")]
    UnloadedSid {
        /// The sid that was not loaded
        sid: Sid,
    },

    /// No entry along the inheritance chain matched the permission check.
    #[error("No applicable access control entry found on '{object}'")]
    NoApplicableEntry {
        /// The identity the check started on
        object: ObjectIdentity,
    },

    /// An argument was rejected before any work was done.
    #[error("Validation error: {message}")]
    Validation {
        /// What went wrong
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// I/O error while reading configuration or fixture files.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the failure, including the path
        message: String,
    },
}

impl Error {
    /// Returns whether retrying the same request may succeed.
    ///
    /// Palisade never retries internally; this is a hint for callers and
    /// outer resilience layers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::BackingStoreUnavailable { .. } => true,
            Error::Timeout { .. } => true,
            Error::LoadAbandoned { .. } => true,
            Error::NotFound { .. } => false,
            Error::DepthExceeded { .. } => false,
            Error::UnloadedSid { .. } => false,
            Error::NoApplicableEntry { .. } => false,
            Error::Validation { .. } => false,
            Error::Config { .. } => false,
            Error::Io { .. } => false,
        }
    }

    /// Creates a not-found error for the given identity.
    pub fn not_found(object: &ObjectIdentity) -> Self {
        Error::NotFound {
            object: object.clone(),
        }
    }

    /// Creates a store-unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Error::BackingStoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates an I/O error that names the path involved.
    pub fn io_with_path(err: std::io::Error, path: &std::path::Path) -> Self {
        Error::Io {
            message: format!("{}: {err}", path.display()),
        }
    }
}
