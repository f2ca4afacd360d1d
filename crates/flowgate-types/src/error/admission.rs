//! Admission-control errors returned by the account selector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a request cannot be admitted to the pool.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum AdmissionError {
    /// Every account is at capacity, degraded, refreshing, or out of credit.
    /// Surfaced to callers as a retryable service-busy condition.
    #[error("No account capacity available{}", wait_hint_secs.map(|s| format!(" (retry in ~{s}s)")).unwrap_or_default())]
    NoCapacity {
        /// Shortest known wait before capacity may free up, if any
        wait_hint_secs: Option<u64>,
    },

    /// The pool has no accounts at all (empty or invalid configuration).
    #[error("Account pool is empty")]
    NoAccounts,

    /// The requested model/generation kind is not served by any account.
    #[error("No account serves generation kind: {kind}")]
    KindUnsupported {
        /// The generation kind that could not be routed
        kind: String,
    },
}

impl AdmissionError {
    /// All admission errors are transient from the client's point of view
    /// except an empty pool, which needs operator action.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::NoAccounts)
    }
}
