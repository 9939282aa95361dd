use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use gmgn_client::GmgnClient;
use pairwatch_common::{logging, Config};
use pairwatch_scout::traits::{IdentityRotator, PairFeed, TokenSink};
use pairwatch_scout::{Pipeline, PipelineSettings, TokenFilter};
use pairwatch_store::TokenStore;
use tor_control::TorController;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    let _log_guard = logging::init(&config.log_file)?;

    info!("Pairwatch scout starting...");
    config.log_redacted();

    let store = TokenStore::connect(&config).await?;
    store.migrate().await?;

    let tor = TorController::new(
        &config.tor_control_host,
        config.tor_control_port,
        Some(&config.tor_password),
    )
    .with_settle_delay(config.tor_settle);
    info!(control = tor.addr(), "Tor controller configured");
    let gmgn = GmgnClient::new(&config.gmgn_base_url, Some(&config.tor_socks_url))?;
    let filter = TokenFilter::open(&config.seen_tokens_file, config.max_tracked_tokens);

    let rotator: Arc<dyn IdentityRotator> = Arc::new(tor);
    let feed: Arc<dyn PairFeed> = Arc::new(gmgn);
    let sink: Arc<dyn TokenSink> = Arc::new(store);

    let pipeline = Pipeline::new(
        rotator,
        feed,
        sink,
        filter,
        PipelineSettings::from_config(&config),
    );

    pipeline.run(shutdown_signal()).await?;

    info!("Pairwatch scout stopped");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
