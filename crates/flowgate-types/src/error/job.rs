//! Job lifecycle errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a terminal backend failure.
///
/// Account-level reasons count against the owning account's failure counter;
/// request-level reasons do not (a bad prompt is not the account's fault).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Content policy violation on the prompt or reference assets
    ContentPolicy,
    /// Reference asset was rejected (wrong format, too large, unreadable)
    InvalidAsset,
    /// The account's credit balance is exhausted
    CreditExhausted,
    /// Backend authentication failure mid-job
    AuthFailure,
    /// Backend rate limit on the account
    RateLimited,
    /// Any other backend-reported terminal error
    BackendError,
}

impl TerminalReason {
    /// Account-level failures affect future selection; request-level ones do not.
    pub const fn is_account_level(&self) -> bool {
        matches!(self, Self::CreditExhausted | Self::AuthFailure | Self::RateLimited)
    }
}

/// Errors raised during a job's lifetime.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum JobError {
    /// Submission to the backend failed (network, proxy, backend reject at
    /// creation). Retryable on a different account up to a bounded count.
    #[error("Job submission failed: {message}")]
    Submission {
        /// Description of the submission failure
        message: String,
    },

    /// A status poll failed transiently; retried in place up to a bound.
    #[error("Polling failed after {attempts} attempts: {message}")]
    Poll {
        /// Number of consecutive poll attempts that failed
        attempts: u32,
        /// Description of the last poll failure
        message: String,
    },

    /// The backend reported an unrecoverable job failure.
    #[error("Backend terminal error ({reason:?}): {message}")]
    Terminal {
        /// Classified failure reason
        reason: TerminalReason,
        /// Backend-provided detail, surfaced verbatim to the caller
        message: String,
    },

    /// No progress arrived within the configured idle window.
    #[error("Job timed out after {idle_secs}s without progress")]
    Timeout {
        /// Idle window that elapsed
        idle_secs: u64,
    },

    /// The client disconnected and the job was cancelled.
    #[error("Job cancelled by client disconnect")]
    Cancelled,

    /// The requested model is not in the catalog.
    #[error("Unsupported model: {model}")]
    UnsupportedModel {
        /// Model name as the client sent it
        model: String,
    },

    /// The request is malformed for its generation kind (e.g. wrong number
    /// of reference images for a first/last-frame job).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Validation failure detail
        message: String,
    },
}

impl JobError {
    /// Whether this failure should be recorded against the owning account.
    pub const fn is_account_level(&self) -> bool {
        match self {
            Self::Submission { .. } => true,
            Self::Terminal { reason, .. } => reason.is_account_level(),
            _ => false,
        }
    }
}
