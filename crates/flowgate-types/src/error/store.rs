//! Credential store errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the credential store's synchronized interface.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum StoreError {
    /// Account with the given ID is not in the pool.
    #[error("Account not found: {id}")]
    NotFound {
        /// Unique identifier of the missing account
        id: String,
    },

    /// A release would have driven an in-flight counter below zero.
    /// Indicates a double-release bug; the counter is left at zero.
    #[error("Invariant violation on account {id}: {message}")]
    InvariantViolation {
        /// Account whose counter was mishandled
        id: String,
        /// Description of the violated invariant
        message: String,
    },
}
