//! Gateway configuration loaded from a JSON file at startup.
//!
//! Every tunable has a serde default so a minimal config only needs the
//! account list and an API key.

use flowgate_types::models::AccountConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer keys accepted on the inbound API. Empty list disables auth.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub flow: FlowEndpoints,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

/// Base URLs for the two Flow API surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEndpoints {
    #[serde(default = "default_labs_base")]
    pub labs_base: String,
    #[serde(default = "default_sandbox_base")]
    pub sandbox_base: String,
}

impl Default for FlowEndpoints {
    fn default() -> Self {
        Self { labs_base: default_labs_base(), sandbox_base: default_sandbox_base() }
    }
}

/// Captcha collaborator settings (createTask/getTaskResult protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub client_key: String,
    #[serde(default = "default_website_url")]
    pub website_url: String,
    #[serde(default)]
    pub website_key: String,
    #[serde(default = "default_page_action")]
    pub page_action: String,
    #[serde(default = "default_captcha_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_captcha_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            client_key: String::new(),
            website_url: default_website_url(),
            website_key: String::new(),
            page_action: default_page_action(),
            poll_interval_secs: default_captcha_poll_secs(),
            timeout_secs: default_captcha_timeout_secs(),
        }
    }
}

/// Operational tunables. Defaults are conservative; override per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Consecutive failures before an account is marked Degraded.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Tokens expiring within this window are treated as stale.
    #[serde(default = "default_token_safety_margin")]
    pub token_safety_margin_secs: i64,
    #[serde(default = "default_refresh_sweep_secs")]
    pub refresh_sweep_interval_secs: u64,
    #[serde(default = "default_refresh_max_attempts")]
    pub refresh_max_attempts: u32,
    #[serde(default = "default_refresh_backoff_base")]
    pub refresh_backoff_base_secs: u64,
    #[serde(default = "default_refresh_backoff_cap")]
    pub refresh_backoff_cap_secs: u64,
    #[serde(default = "default_credit_sweep_secs")]
    pub credit_sweep_interval_secs: u64,
    /// Video status poll cadence.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Consecutive transient poll failures tolerated before the job fails.
    #[serde(default = "default_poll_max_failures")]
    pub poll_max_failures: u32,
    #[serde(default = "default_image_idle_timeout")]
    pub image_idle_timeout_secs: u64,
    #[serde(default = "default_video_idle_timeout")]
    pub video_idle_timeout_secs: u64,
    /// Distinct accounts tried before a submission is abandoned.
    #[serde(default = "default_submit_max_accounts")]
    pub submit_max_accounts: u32,
    /// Bound on the selector's reactive-refresh wait when the pool is dry.
    #[serde(default = "default_selector_refresh_wait")]
    pub selector_refresh_wait_secs: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            token_safety_margin_secs: default_token_safety_margin(),
            refresh_sweep_interval_secs: default_refresh_sweep_secs(),
            refresh_max_attempts: default_refresh_max_attempts(),
            refresh_backoff_base_secs: default_refresh_backoff_base(),
            refresh_backoff_cap_secs: default_refresh_backoff_cap(),
            credit_sweep_interval_secs: default_credit_sweep_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_failures: default_poll_max_failures(),
            image_idle_timeout_secs: default_image_idle_timeout(),
            video_idle_timeout_secs: default_video_idle_timeout(),
            submit_max_accounts: default_submit_max_accounts(),
            selector_refresh_wait_secs: default_selector_refresh_wait(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8045
}
fn default_labs_base() -> String {
    "https://labs.google/fx/api".to_string()
}
fn default_sandbox_base() -> String {
    "https://aisandbox-pa.googleapis.com/v1".to_string()
}
fn default_website_url() -> String {
    "https://labs.google".to_string()
}
fn default_page_action() -> String {
    "FLOW_GENERATION".to_string()
}
fn default_captcha_poll_secs() -> u64 {
    3
}
fn default_captcha_timeout_secs() -> u64 {
    120
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_token_safety_margin() -> i64 {
    3600
}
fn default_refresh_sweep_secs() -> u64 {
    300
}
fn default_refresh_max_attempts() -> u32 {
    3
}
fn default_refresh_backoff_base() -> u64 {
    2
}
fn default_refresh_backoff_cap() -> u64 {
    60
}
fn default_credit_sweep_secs() -> u64 {
    600
}
fn default_poll_interval_secs() -> u64 {
    3
}
fn default_poll_max_failures() -> u32 {
    5
}
fn default_image_idle_timeout() -> u64 {
    120
}
fn default_video_idle_timeout() -> u64 {
    600
}
fn default_submit_max_accounts() -> u32 {
    3
}
fn default_selector_refresh_wait() -> u64 {
    30
}

impl GatewayConfig {
    /// Load and validate a config file.
    pub async fn load(path: &Path) -> Result<Self, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read config {:?}: {}", path, e))?;
        let config: GatewayConfig = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse config {:?}: {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.id.is_empty() {
                return Err("account with empty id".to_string());
            }
            if !seen.insert(account.id.as_str()) {
                return Err(format!("duplicate account id '{}'", account.id));
            }
            if account.session_token.is_empty() {
                return Err(format!("account '{}' has empty session_token", account.id));
            }
        }
        if self.tuning.submit_max_accounts == 0 {
            return Err("submit_max_accounts must be at least 1".to_string());
        }
        if self.tuning.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
