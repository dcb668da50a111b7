//! Defines the errors reported by groups and the group registry.
//!
//! Loaders and peers report their failures as plain **anyhow::Error**. Once such an error
//! passes through a [Group](crate::group::Group) it is wrapped into a
//! [CacheError::LoadFailure](CacheError::LoadFailure) which can be cloned, so that all callers
//! waiting for the same load receive the same error.
use std::sync::Arc;

use thiserror::Error;

/// Enumerates the failures of the cache layer.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// An empty key was passed to a lookup.
    #[error("a non-empty key is required")]
    InvalidArgument,

    /// A group with the given name has already been registered.
    #[error("a group named '{0}' already exists")]
    AlreadyExists(String),

    /// No group with the given name is known.
    #[error("unknown group: {0}")]
    NotFound(String),

    /// The loader or the remote peer failed to provide a value.
    #[error("failed to load '{key}': {cause:#}")]
    LoadFailure {
        /// The key which was being loaded.
        key: String,
        /// The error reported by the loader or the peer.
        cause: Arc<anyhow::Error>,
    },

    /// A group was set up with an incomplete or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Wraps the given cause into a **LoadFailure** for the given key.
    pub fn load_failure(key: &str, cause: anyhow::Error) -> Self {
        CacheError::LoadFailure {
            key: key.to_owned(),
            cause: Arc::new(cause),
        }
    }

    /// Returns the underlying error if this is a **LoadFailure**.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            CacheError::LoadFailure { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }

    /// Determines if the error was caused by the caller rather than by a data source.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidArgument | CacheError::NotFound(_) | CacheError::AlreadyExists(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CacheError;

    #[test]
    fn load_failures_keep_their_cause() {
        let error = CacheError::load_failure("Tom", anyhow::anyhow!("Tom does not exist"));

        assert_eq!(
            error.cause().map(|cause| cause.to_string()),
            Some("Tom does not exist".to_owned())
        );
        assert_eq!(error.to_string(), "failed to load 'Tom': Tom does not exist");
        assert_eq!(error.is_client_error(), false);
        assert_eq!(CacheError::InvalidArgument.is_client_error(), true);
    }
}
