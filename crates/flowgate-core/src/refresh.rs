//! Token refresher: keeps each account's access token valid.
//!
//! Proactive path: a background sweep renews tokens expiring within the
//! safety margin. Reactive path: the selector calls `ensure_fresh` when
//! the eligible set is empty but an account has merely gone stale.
//! Renewal per account is single-flight; a second caller blocks on the
//! per-account lock and finds a fresh token when it gets in.

use crate::captcha::CaptchaSolver;
use crate::config::TuningConfig;
use crate::flow::FlowBackend;
use crate::store::CredentialStore;
use flowgate_types::error::RefreshError;
use flowgate_types::models::AccountStatus;
use std::sync::Arc;
use std::time::Duration;

pub struct TokenRefresher {
    store: Arc<CredentialStore>,
    backend: Arc<dyn FlowBackend>,
    solver: Arc<dyn CaptchaSolver>,
    tuning: TuningConfig,
}

impl TokenRefresher {
    pub fn new(
        store: Arc<CredentialStore>,
        backend: Arc<dyn FlowBackend>,
        solver: Arc<dyn CaptchaSolver>,
        tuning: TuningConfig,
    ) -> Self {
        Self { store, backend, solver, tuning }
    }

    fn token_is_fresh(&self, account_id: &str) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.store
            .get_snapshot(account_id)
            .map(|s| s.token_valid_beyond(now, self.tuning.token_safety_margin_secs))
            .unwrap_or(false)
    }

    /// Refresh only if the token is stale. Safe to call on every selection.
    pub async fn ensure_fresh(&self, account_id: &str) -> Result<(), RefreshError> {
        if self.token_is_fresh(account_id) {
            return Ok(());
        }
        self.refresh_account(account_id).await
    }

    /// Renew one account's token, single-flight per account.
    pub async fn refresh_account(&self, account_id: &str) -> Result<(), RefreshError> {
        let lock = self.store.refresh_lock(account_id);
        let _guard = lock.lock().await;

        // A concurrent caller may have finished the renewal while we
        // waited on the lock.
        if self.token_is_fresh(account_id) {
            return Ok(());
        }

        let session_token = self.store.session_token(account_id).map_err(|_| {
            RefreshError::AuthRejected {
                id: account_id.to_string(),
                message: "account not found".to_string(),
            }
        })?;
        let proxy_url =
            self.store.get_snapshot(account_id).and_then(|s| s.proxy_url);

        // Refreshing hides the account from the selector for the duration.
        // Every exit path below sets a definitive status.
        let _ = self.store.mark_refreshing(account_id);

        let max_attempts = self.tuning.refresh_max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.attempt_renewal(account_id, &session_token, proxy_url.as_deref()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_irrecoverable() => {
                    tracing::error!(account_id, error = %e, "session material rejected, disabling account");
                    let _ = self.store.set_status(account_id, AccountStatus::Disabled);
                    return Err(RefreshError::AuthRejected {
                        id: account_id.to_string(),
                        message: e.to_string(),
                    });
                },
                Err(e) if attempt < max_attempts => {
                    let backoff = self
                        .tuning
                        .refresh_backoff_base_secs
                        .saturating_mul(1 << (attempt - 1))
                        .min(self.tuning.refresh_backoff_cap_secs);
                    tracing::warn!(
                        account_id,
                        attempt,
                        backoff_secs = backoff,
                        error = %e,
                        "token renewal attempt failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                },
                Err(e) => {
                    tracing::error!(
                        account_id,
                        attempts = max_attempts,
                        error = %e,
                        "token renewal attempts exhausted"
                    );
                    self.store.record_failure(account_id);
                    let _ = self.store.set_status(account_id, AccountStatus::Degraded);
                    return Err(RefreshError::AttemptsExhausted {
                        id: account_id.to_string(),
                        attempts: max_attempts,
                    });
                },
            }
        }
        unreachable!("renewal loop returns on every branch")
    }

    async fn attempt_renewal(
        &self,
        account_id: &str,
        session_token: &str,
        proxy_url: Option<&str>,
    ) -> Result<(), RefreshError> {
        let session = match self.backend.fetch_session(session_token, None, proxy_url).await {
            Ok(session) => session,
            Err(RefreshError::ChallengeRequired) => {
                tracing::info!(account_id, "renewal challenged, consulting captcha collaborator");
                let solution = self.solver.solve().await?;
                self.backend.fetch_session(session_token, Some(&solution), proxy_url).await?
            },
            Err(e) => return Err(e),
        };

        let expires_at = session.expires_at().ok_or_else(|| RefreshError::MalformedResponse {
            message: format!("unparseable expiry '{}'", session.expires),
        })?;
        let email = session.user.and_then(|u| u.email);

        self.store
            .update_token(account_id, session.access_token.clone(), expires_at, email)
            .map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;
        self.store.record_success(account_id);
        tracing::info!(account_id, expires_at, "access token renewed");

        self.sync_account_state(account_id, session_token, &session.access_token, proxy_url).await;
        Ok(())
    }

    /// Post-renewal bookkeeping: balance and project id. Failures here
    /// are logged, never fatal to the renewal.
    async fn sync_account_state(
        &self,
        account_id: &str,
        session_token: &str,
        access_token: &str,
        proxy_url: Option<&str>,
    ) {
        match self.backend.fetch_credits(access_token, proxy_url).await {
            Ok(info) => {
                let _ = self.store.update_credits(account_id, info.credits, info.user_paygate_tier);
                tracing::debug!(account_id, credits = info.credits, "credit balance updated");
            },
            Err(e) => tracing::warn!(account_id, error = %e, "credit query failed after renewal"),
        }

        let has_project =
            self.store.get_snapshot(account_id).map(|s| s.project_id.is_some()).unwrap_or(false);
        if !has_project {
            let title = format!("flowgate-{}", account_id);
            match self.backend.create_project(session_token, &title, proxy_url).await {
                Ok(project_id) => {
                    tracing::info!(account_id, project_id = %project_id, "created generation project");
                    let _ = self.store.update_project(account_id, project_id);
                },
                Err(e) => tracing::warn!(account_id, error = %e, "project creation failed"),
            }
        }
    }

    /// Background loops: token sweep and credit sweep.
    pub fn spawn_sweeps(self: &Arc<Self>) {
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                refresher.tuning.refresh_sweep_interval_secs.max(1),
            ));
            // accounts were just loaded, skip the immediate tick
            interval.tick().await;
            loop {
                interval.tick().await;
                refresher.run_refresh_sweep().await;
            }
        });

        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                refresher.tuning.credit_sweep_interval_secs.max(1),
            ));
            interval.tick().await;
            loop {
                interval.tick().await;
                refresher.run_credit_sweep().await;
            }
        });
        tracing::info!("refresh and credit sweeps started");
    }

    pub async fn run_refresh_sweep(&self) {
        let now = chrono::Utc::now().timestamp();
        let stale = self.store.stale_token_accounts(now, self.tuning.token_safety_margin_secs);
        if stale.is_empty() {
            return;
        }
        tracing::info!(count = stale.len(), "refresh sweep found stale tokens");
        for account_id in stale {
            if let Err(e) = self.refresh_account(&account_id).await {
                tracing::warn!(account_id = %account_id, error = %e, "sweep refresh failed");
            }
        }
    }

    pub async fn run_credit_sweep(&self) {
        for snapshot in self.store.snapshots() {
            if snapshot.status == AccountStatus::Disabled {
                continue;
            }
            let Some(access_token) = snapshot.access_token else { continue };
            match self.backend.fetch_credits(&access_token, snapshot.proxy_url.as_deref()).await {
                Ok(info) => {
                    let _ = self.store.update_credits(
                        &snapshot.id,
                        info.credits,
                        info.user_paygate_tier,
                    );
                    if info.credits == 0 {
                        tracing::warn!(account_id = %snapshot.id, "account balance exhausted");
                    }
                },
                Err(e) => {
                    tracing::warn!(account_id = %snapshot.id, error = %e, "credit sweep query failed")
                },
            }
        }
    }
}
