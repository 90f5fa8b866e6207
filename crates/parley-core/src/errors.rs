//! Unified error system for Parley.
//!
//! One enum covers the whole taxonomy: validation (`Invalid`), authn/authz
//! (`NotAllowed`), missing entities (`NotFound`), cap/lifecycle conflicts
//! (`Conflict`), the distinguished forgotten-token condition, and fatal
//! persistence failures (`Storage`). Every operation returns
//! `MarketResult<T>`, the explicit ok/error tagged union; nothing is
//! thrown past the boundary.

use crate::idents::Username;
use serde::{Deserialize, Serialize};

/// Unified error type for all market operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MarketError {
    /// Malformed input, rejected before any state is touched.
    #[error("invalid: {message}")]
    Invalid { message: String },

    /// Not logged in, wrong actor, or missing trust.
    #[error("not allowed: {message}")]
    NotAllowed { message: String },

    /// The named entity does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The operation is well-formed but the world-state forbids it (cap
    /// exceeded, market closed or resolved, duplicate registration).
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A cryptographically valid credential whose owner is absent from
    /// current state. The boundary layer should clear the client's
    /// credential on this, not retry.
    #[error("forgotten token for {owner}")]
    ForgottenToken { owner: Username },

    /// Persistence-layer failure. Nothing was committed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Internal failure that should never happen in normal operation.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl MarketError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::NotAllowed {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for MarketError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Standard Result type for market operations.
pub type MarketResult<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_message() {
        let err = MarketError::conflict("username taken");
        assert_eq!(err.to_string(), "conflict: username taken");
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(matches!(MarketError::from(io), MarketError::Storage { .. }));
    }
}
