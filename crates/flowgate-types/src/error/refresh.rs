//! Token refresh errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while renewing an account's access token.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum RefreshError {
    /// The captcha collaborator did not return a solution within the timeout.
    #[error("Captcha solving timed out after {timeout_secs}s")]
    CaptchaTimeout {
        /// Configured captcha timeout in seconds
        timeout_secs: u64,
    },

    /// The captcha collaborator answered but could not solve the challenge.
    #[error("Captcha solving failed: {message}")]
    CaptchaFailed {
        /// Failure detail from the collaborator
        message: String,
    },

    /// The backend rejected the session material outright. The session token
    /// is revoked or expired; retrying will not help.
    #[error("Session renewal rejected for account {id}: {message}")]
    AuthRejected {
        /// Account whose session was rejected
        id: String,
        /// Backend-provided rejection detail
        message: String,
    },

    /// The backend demands a captcha solution before it will renew.
    #[error("Session renewal requires a captcha solution")]
    ChallengeRequired,

    /// Network or transport failure talking to the renewal endpoint.
    #[error("Session renewal transport error: {message}")]
    Network {
        /// Description of the transport failure
        message: String,
    },

    /// The renewal response was missing required fields.
    #[error("Malformed session renewal response: {message}")]
    MalformedResponse {
        /// What was missing or unparseable
        message: String,
    },

    /// All retry attempts for one sweep cycle were exhausted.
    #[error("Refresh attempts exhausted for account {id} after {attempts} tries")]
    AttemptsExhausted {
        /// Account that could not be refreshed
        id: String,
        /// Number of attempts made
        attempts: u32,
    },
}

impl RefreshError {
    /// Transient errors are retried with backoff within the same sweep cycle.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CaptchaTimeout { .. }
                | Self::CaptchaFailed { .. }
                | Self::ChallengeRequired
                | Self::Network { .. }
        )
    }

    /// Whether this failure proves the stored session material is dead,
    /// which disables the account rather than degrading it.
    pub const fn is_irrecoverable(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transience_classification() {
        let transient = RefreshError::Network { message: "reset".to_string() };
        let fatal = RefreshError::AuthRejected { id: "a".to_string(), message: "401".to_string() };

        assert!(transient.is_transient());
        assert!(!transient.is_irrecoverable());
        assert!(!fatal.is_transient());
        assert!(fatal.is_irrecoverable());
    }
}
