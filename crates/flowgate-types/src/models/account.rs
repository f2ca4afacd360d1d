//! Account model and related types.

use serde::{Deserialize, Serialize};

/// Health status of one backend account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Eligible for selection
    Healthy,
    /// A token refresh is in flight; excluded from selection until it resolves
    Refreshing,
    /// Consecutive failures reached the threshold; excluded until a recheck succeeds
    Degraded,
    /// Session material is dead (irrecoverable auth failure) or operator-disabled
    Disabled,
}

impl AccountStatus {
    /// Whether the account may be handed new work.
    pub const fn is_selectable(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Static configuration for one account, loaded at process start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    /// Unique identifier for the account
    pub id: String,
    /// Backend session token used as refresh material (opaque)
    pub session_token: String,
    /// Outbound proxy URL bound to this account, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Maximum concurrent jobs this account may run
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    /// Pre-provisioned backend project, if the operator supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Optional generation-kind restriction (empty = all kinds)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<super::GenerationKind>,
}

fn default_max_concurrent() -> u32 {
    3
}

/// Read-only copy of an account's live state, as handed out by the store.
///
/// A snapshot is valid for one decision point only; holders must not cache it
/// across awaits that could change pool state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    /// Unique identifier for the account
    pub id: String,
    /// Current access token, if one has ever been obtained
    pub access_token: Option<String>,
    /// Unix timestamp when the access token expires
    pub token_expires_at: Option<i64>,
    /// Current health status
    pub status: AccountStatus,
    /// Remaining credit balance reported by the backend
    pub credits: i64,
    /// Backend paygate tier, echoed into video submissions
    pub paygate_tier: Option<String>,
    /// Backend project scoping generation calls
    pub project_id: Option<String>,
    /// Outbound proxy URL bound to this account
    pub proxy_url: Option<String>,
    /// Jobs currently in flight on this account
    pub in_flight: u32,
    /// Configured concurrency capacity
    pub max_concurrent: u32,
    /// Consecutive submission/refresh failures since the last success
    pub consecutive_failures: u32,
    /// Unix timestamp (millis) of the last time the selector picked this account
    pub last_selected_ms: i64,
}

impl AccountSnapshot {
    /// Fraction of capacity currently in use. `1.0` when capacity is zero.
    pub fn load_ratio(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 1.0;
        }
        f64::from(self.in_flight) / f64::from(self.max_concurrent)
    }

    /// Whether the token is still valid at `now + margin_secs`.
    pub fn token_valid_beyond(&self, now: i64, margin_secs: i64) -> bool {
        match (self.access_token.as_deref(), self.token_expires_at) {
            (Some(t), Some(exp)) if !t.is_empty() => exp > now + margin_secs,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AccountSnapshot {
        AccountSnapshot {
            id: "a1".to_string(),
            access_token: Some("at".to_string()),
            token_expires_at: Some(10_000),
            status: AccountStatus::Healthy,
            credits: 100,
            paygate_tier: None,
            project_id: None,
            proxy_url: None,
            in_flight: 1,
            max_concurrent: 4,
            consecutive_failures: 0,
            last_selected_ms: 0,
        }
    }

    #[test]
    fn test_load_ratio() {
        let s = snapshot();
        assert!((s.load_ratio() - 0.25).abs() < f64::EPSILON);

        let zero_cap = AccountSnapshot { max_concurrent: 0, ..snapshot() };
        assert!((zero_cap.load_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_token_validity_margin() {
        let s = snapshot();
        assert!(s.token_valid_beyond(5_000, 1_000));
        assert!(!s.token_valid_beyond(9_500, 1_000));

        let no_token = AccountSnapshot { access_token: None, ..snapshot() };
        assert!(!no_token.token_valid_beyond(0, 0));
    }
}
