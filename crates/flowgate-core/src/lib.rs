//! Flowgate core: credential orchestration and the OpenAI boundary.
//!
//! Everything stateful lives here: the credential store with per-account
//! concurrency accounting, the captcha-gated token refresher, the
//! load-balanced account selector, the job orchestrator driving Flow's
//! submit/poll lifecycle, and the axum handlers that translate it all
//! into OpenAI chat-completions traffic.

pub mod captcha;
pub mod config;
pub mod flow;
pub mod handlers;
pub mod middleware;
pub mod orchestrator;
pub mod outbound;
pub mod refresh;
pub mod select;
pub mod store;

pub use config::GatewayConfig;
pub use orchestrator::{JobEvent, JobOrchestrator};
pub use refresh::TokenRefresher;
pub use select::AccountSelector;
pub use store::CredentialStore;
