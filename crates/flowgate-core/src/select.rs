//! Account selection and admission control.
//!
//! Ranks eligible accounts by load, balance, and recency, then walks the
//! ranking with `try_reserve` so a concurrent caller grabbing the same
//! slot falls through to the next candidate instead of over-admitting.

use crate::refresh::TokenRefresher;
use crate::store::CredentialStore;
use flowgate_types::error::AdmissionError;
use flowgate_types::models::{AccountSnapshot, GenerationKind};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TuningConfig;
use crate::store::ReservationGuard;

/// A reserved slot on one account. Dropping the lease frees the slot.
#[derive(Debug)]
pub struct Lease {
    snapshot: AccountSnapshot,
    _guard: ReservationGuard,
}

impl Lease {
    pub fn account_id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn snapshot(&self) -> &AccountSnapshot {
        &self.snapshot
    }
}

pub struct AccountSelector {
    store: Arc<CredentialStore>,
    refresher: Arc<TokenRefresher>,
    tuning: TuningConfig,
}

impl AccountSelector {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<TokenRefresher>,
        tuning: TuningConfig,
    ) -> Self {
        Self { store, refresher, tuning }
    }

    pub async fn acquire(&self, kind: GenerationKind) -> Result<Lease, AdmissionError> {
        self.acquire_excluding(kind, &HashSet::new()).await
    }

    /// Reserve a slot on the best eligible account not in `excluded`.
    ///
    /// When the eligible set is empty, tries one reactive token refresh on
    /// the least recently used candidate before giving up, bounded by
    /// `selector_refresh_wait_secs`.
    pub async fn acquire_excluding(
        &self,
        kind: GenerationKind,
        excluded: &HashSet<String>,
    ) -> Result<Lease, AdmissionError> {
        if let Some(lease) = self.try_acquire_ranked(kind, excluded) {
            return Ok(lease);
        }

        // Nothing eligible right now. If an account merely has a stale
        // token, one refresh can bring it back.
        let candidates = self.store.refresh_candidates(kind);
        if self.store.is_empty() {
            return Err(AdmissionError::NoAccounts);
        }
        if candidates.is_empty() {
            return Err(AdmissionError::KindUnsupported { kind: kind.to_string() });
        }
        if let Some(candidate) = candidates.iter().find(|id| !excluded.contains(id.as_str())) {
            tracing::info!(
                account_id = %candidate,
                kind = %kind,
                "pool dry, attempting reactive refresh"
            );
            let refresh = self.refresher.ensure_fresh(candidate);
            let wait = Duration::from_secs(self.tuning.selector_refresh_wait_secs.max(1));
            match tokio::time::timeout(wait, refresh).await {
                Ok(Ok(())) => {
                    if let Some(lease) = self.try_acquire_ranked(kind, excluded) {
                        return Ok(lease);
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(account_id = %candidate, error = %e, "reactive refresh failed")
                },
                Err(_) => {
                    tracing::warn!(account_id = %candidate, "reactive refresh timed out")
                },
            }
        }

        Err(AdmissionError::NoCapacity {
            wait_hint_secs: Some(self.tuning.poll_interval_secs),
        })
    }

    /// One pass: rank the currently eligible accounts and walk the ranking.
    /// `try_reserve` can still lose a race for the last slot, in which case
    /// the next candidate is tried.
    fn try_acquire_ranked(&self, kind: GenerationKind, excluded: &HashSet<String>) -> Option<Lease> {
        let now = chrono::Utc::now().timestamp();
        let mut eligible: Vec<AccountSnapshot> = self
            .store
            .list_eligible(kind, now, self.tuning.token_safety_margin_secs)
            .into_iter()
            .filter(|s| !excluded.contains(&s.id))
            .collect();
        eligible.sort_by(rank);

        for snapshot in eligible {
            if let Some(guard) = self.store.try_reserve(&snapshot.id) {
                let now_ms = chrono::Utc::now().timestamp_millis();
                self.store.note_selected(&snapshot.id, now_ms);
                tracing::debug!(
                    account_id = %snapshot.id,
                    in_flight = snapshot.in_flight + 1,
                    max_concurrent = snapshot.max_concurrent,
                    "account leased"
                );
                return Some(Lease { snapshot, _guard: guard });
            }
        }
        None
    }
}

/// Least loaded first, then richest, then least recently selected.
fn rank(a: &AccountSnapshot, b: &AccountSnapshot) -> Ordering {
    a.load_ratio()
        .partial_cmp(&b.load_ratio())
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.credits.cmp(&a.credits))
        .then_with(|| a.last_selected_ms.cmp(&b.last_selected_ms))
}
