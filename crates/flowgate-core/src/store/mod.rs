//! Credential store: the sole owner of mutable account state.
//!
//! Key responsibilities:
//! - Per-account token, credit, project and status bookkeeping
//! - Atomic in-flight slot reservation (per-account concurrency cap)
//! - Consecutive-failure tracking with Degraded demotion at threshold
//! - Per-account refresh locks for single-flight token renewal
//!
//! Fine-grained locking only: DashMap entry locks plus atomic counters,
//! never a pool-wide lock.

use dashmap::DashMap;
use flowgate_types::error::StoreError;
use flowgate_types::models::{AccountConfig, AccountSnapshot, AccountStatus, GenerationKind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

mod reservation;

pub use reservation::ReservationGuard;

/// Credits value before the first balance fetch. Unknown balances stay
/// eligible until the credit sweep proves otherwise.
const CREDITS_UNKNOWN: i64 = -1;

struct AccountRecord {
    config: AccountConfig,
    access_token: Option<String>,
    token_expires_at: Option<i64>,
    status: AccountStatus,
    credits: i64,
    paygate_tier: Option<String>,
    project_id: Option<String>,
    email: Option<String>,
    consecutive_failures: u32,
    last_selected_ms: i64,
}

impl AccountRecord {
    fn new(config: AccountConfig) -> Self {
        let project_id = config.project_id.clone();
        Self {
            config,
            access_token: None,
            token_expires_at: None,
            status: AccountStatus::Healthy,
            credits: CREDITS_UNKNOWN,
            paygate_tier: None,
            project_id,
            email: None,
            consecutive_failures: 0,
            last_selected_ms: 0,
        }
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        self.config.kinds.is_empty() || self.config.kinds.contains(&kind)
    }
}

/// Thread-safe account pool state.
pub struct CredentialStore {
    accounts: DashMap<String, AccountRecord>,
    in_flight: Arc<DashMap<String, AtomicU32>>,
    refresh_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    failure_threshold: u32,
}

impl CredentialStore {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            accounts: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
            refresh_locks: DashMap::new(),
            failure_threshold,
        }
    }

    /// Load accounts from config. Replaces any existing entry with the
    /// same id.
    pub fn load_accounts(&self, configs: Vec<AccountConfig>) -> usize {
        let count = configs.len();
        for config in configs {
            let id = config.id.clone();
            self.accounts.insert(id, AccountRecord::new(config));
        }
        tracing::info!(count, "loaded accounts into credential store");
        count
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn in_flight(&self, account_id: &str) -> u32 {
        self.in_flight.get(account_id).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
    }

    pub fn get_snapshot(&self, account_id: &str) -> Option<AccountSnapshot> {
        let record = self.accounts.get(account_id)?;
        Some(self.snapshot_of(account_id, &record))
    }

    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        self.accounts.iter().map(|e| self.snapshot_of(e.key(), e.value())).collect()
    }

    fn snapshot_of(&self, id: &str, record: &AccountRecord) -> AccountSnapshot {
        AccountSnapshot {
            id: id.to_string(),
            access_token: record.access_token.clone(),
            token_expires_at: record.token_expires_at,
            status: record.status,
            credits: record.credits,
            paygate_tier: record.paygate_tier.clone(),
            project_id: record.project_id.clone(),
            proxy_url: record.config.proxy_url.clone(),
            in_flight: self.in_flight(id),
            max_concurrent: record.config.max_concurrent,
            consecutive_failures: record.consecutive_failures,
            last_selected_ms: record.last_selected_ms,
        }
    }

    /// Session token (refresh material) for an account.
    pub fn session_token(&self, account_id: &str) -> Result<String, StoreError> {
        self.accounts
            .get(account_id)
            .map(|r| r.config.session_token.clone())
            .ok_or_else(|| StoreError::NotFound { id: account_id.to_string() })
    }

    /// Atomically reserve an in-flight slot. Succeeds only for a Healthy
    /// account with known-nonzero credit and a free slot.
    pub fn try_reserve(&self, account_id: &str) -> Option<ReservationGuard> {
        let (capacity, selectable) = {
            let record = self.accounts.get(account_id)?;
            (record.config.max_concurrent, record.status.is_selectable() && record.credits != 0)
        };
        if !selectable {
            return None;
        }
        ReservationGuard::try_new(Arc::clone(&self.in_flight), account_id.to_string(), capacity)
    }

    /// Accounts that could serve `kind` right now: Healthy, token valid
    /// beyond the safety margin, free capacity, nonzero credit.
    pub fn list_eligible(
        &self,
        kind: GenerationKind,
        now: i64,
        margin_secs: i64,
    ) -> Vec<AccountSnapshot> {
        self.accounts
            .iter()
            .filter(|e| {
                let r = e.value();
                r.status == AccountStatus::Healthy && r.supports(kind) && r.credits != 0
            })
            .map(|e| self.snapshot_of(e.key(), e.value()))
            .filter(|s| s.token_valid_beyond(now, margin_secs) && s.in_flight < s.max_concurrent)
            .collect()
    }

    /// Candidates for a reactive refresh: any non-Disabled account that
    /// supports `kind`, least recently selected first.
    pub fn refresh_candidates(&self, kind: GenerationKind) -> Vec<String> {
        let mut candidates: Vec<(String, i64)> = self
            .accounts
            .iter()
            .filter(|e| e.value().status != AccountStatus::Disabled && e.value().supports(kind))
            .map(|e| (e.key().clone(), e.value().last_selected_ms))
            .collect();
        candidates.sort_by_key(|(_, last)| *last);
        candidates.into_iter().map(|(id, _)| id).collect()
    }

    /// Accounts whose token is missing or expires within the margin.
    /// Used by the proactive refresh sweep. Disabled accounts excluded.
    pub fn stale_token_accounts(&self, now: i64, margin_secs: i64) -> Vec<String> {
        self.accounts
            .iter()
            .filter(|e| {
                let r = e.value();
                if r.status == AccountStatus::Disabled {
                    return false;
                }
                match r.token_expires_at {
                    Some(exp) if r.access_token.is_some() => exp - now < margin_secs,
                    _ => true,
                }
            })
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn update_token(
        &self,
        account_id: &str,
        access_token: String,
        expires_at: i64,
        email: Option<String>,
    ) -> Result<(), StoreError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound { id: account_id.to_string() })?;
        record.access_token = Some(access_token);
        record.token_expires_at = Some(expires_at);
        if email.is_some() {
            record.email = email;
        }
        if record.status != AccountStatus::Disabled {
            record.status = AccountStatus::Healthy;
        }
        Ok(())
    }

    pub fn update_credits(
        &self,
        account_id: &str,
        credits: i64,
        paygate_tier: Option<String>,
    ) -> Result<(), StoreError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound { id: account_id.to_string() })?;
        record.credits = credits;
        if paygate_tier.is_some() {
            record.paygate_tier = paygate_tier;
        }
        Ok(())
    }

    pub fn update_project(&self, account_id: &str, project_id: String) -> Result<(), StoreError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound { id: account_id.to_string() })?;
        record.project_id = Some(project_id);
        Ok(())
    }

    /// Set status to Refreshing, hiding the account from selection for
    /// the duration of a renewal. Returns the previous status.
    pub fn mark_refreshing(&self, account_id: &str) -> Result<AccountStatus, StoreError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound { id: account_id.to_string() })?;
        let previous = record.status;
        record.status = AccountStatus::Refreshing;
        Ok(previous)
    }

    pub fn set_status(&self, account_id: &str, status: AccountStatus) -> Result<(), StoreError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound { id: account_id.to_string() })?;
        record.status = status;
        Ok(())
    }

    /// Record an account-level failure. Returns the new consecutive count;
    /// at the threshold the account is demoted to Degraded.
    pub fn record_failure(&self, account_id: &str) -> u32 {
        let Some(mut record) = self.accounts.get_mut(account_id) else {
            return 0;
        };
        record.consecutive_failures += 1;
        let count = record.consecutive_failures;
        if count >= self.failure_threshold && record.status == AccountStatus::Healthy {
            record.status = AccountStatus::Degraded;
            tracing::warn!(
                account_id,
                consecutive_failures = count,
                "account demoted to Degraded"
            );
        }
        count
    }

    /// Record a successful operation: failure counter resets and a
    /// Degraded account recovers to Healthy.
    pub fn record_success(&self, account_id: &str) {
        if let Some(mut record) = self.accounts.get_mut(account_id) {
            record.consecutive_failures = 0;
            if record.status == AccountStatus::Degraded {
                record.status = AccountStatus::Healthy;
                tracing::info!(account_id, "account recovered to Healthy");
            }
        }
    }

    pub fn note_selected(&self, account_id: &str, now_ms: i64) {
        if let Some(mut record) = self.accounts.get_mut(account_id) {
            record.last_selected_ms = now_ms;
        }
    }

    /// Per-account lock keeping token renewal single-flight.
    pub fn refresh_lock(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
