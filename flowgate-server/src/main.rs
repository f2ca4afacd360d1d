//! Flowgate server daemon.
//!
//! Loads the account pool from a JSON config, starts the token and
//! credit sweeps, and serves the OpenAI-compatible API.

use anyhow::{Context, Result};
use clap::Parser;
use flowgate_core::captcha::{CaptchaSolver, HttpCaptchaSolver};
use flowgate_core::flow::{FlowBackend, FlowClient};
use flowgate_core::handlers::{self, AppState};
use flowgate_core::outbound::ProxyPool;
use flowgate_core::{
    AccountSelector, CredentialStore, GatewayConfig, JobOrchestrator, TokenRefresher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowgate-server", about = "OpenAI-compatible gateway for Flow media generation")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "FLOWGATE_CONFIG", default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("loading {:?}", cli.config))?;

    let pool = Arc::new(ProxyPool::new().map_err(|e| anyhow::anyhow!(e))?);
    let store = Arc::new(CredentialStore::new(config.tuning.failure_threshold));
    let loaded = store.load_accounts(config.accounts.clone());
    info!(accounts = loaded, "account pool loaded");

    let captcha_client = pool
        .client_for(None)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let solver: Arc<dyn CaptchaSolver> =
        Arc::new(HttpCaptchaSolver::new(captcha_client, config.captcha.clone()));
    let backend: Arc<dyn FlowBackend> = Arc::new(FlowClient::new(
        Arc::clone(&pool),
        config.flow.clone(),
        Arc::clone(&solver),
    ));

    let refresher = Arc::new(TokenRefresher::new(
        Arc::clone(&store),
        Arc::clone(&backend),
        Arc::clone(&solver),
        config.tuning.clone(),
    ));
    refresher.spawn_sweeps();
    {
        // accounts start without access tokens; warm them up in the
        // background so the first requests don't all pay refresh latency
        let refresher = Arc::clone(&refresher);
        tokio::spawn(async move {
            refresher.run_refresh_sweep().await;
        });
    }

    let selector = Arc::new(AccountSelector::new(
        Arc::clone(&store),
        Arc::clone(&refresher),
        config.tuning.clone(),
    ));
    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::clone(&store),
        backend,
        selector,
        config.tuning.clone(),
    ));

    let state = AppState {
        orchestrator,
        store,
        api_keys: Arc::new(config.api_keys.clone()),
    };
    let router = handlers::build_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("🚀 Flowgate listening on {}", addr);

    axum::serve(listener, router).await.context("server exited")?;
    Ok(())
}
