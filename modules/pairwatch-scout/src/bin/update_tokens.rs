use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use gmgn_client::GmgnClient;
use pairwatch_common::{logging, Config, TokenUpdate};
use pairwatch_scout::traits::TokenInfoSource;
use pairwatch_scout::updates::{refresh_live_tokens, LiveTokenSchedule, UpdateSettings};
use pairwatch_store::TokenStore;

#[derive(Parser)]
#[command(name = "update-tokens", about = "Refresh metadata for live tokens")]
struct Cli {
    /// Run a single refresh and exit
    #[arg(long)]
    once: bool,

    /// Minutes between refreshes when looping
    #[arg(long, default_value_t = 15)]
    interval_mins: u64,

    /// Only write back tokens with non-zero volume
    #[arg(long)]
    active_only: bool,

    /// Also write each run's raw updates to this JSON file
    #[arg(long)]
    dump: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let _log_guard = logging::init(&config.log_file)?;

    info!("Token updater starting...");
    config.log_redacted();

    let store = TokenStore::connect(&config).await?;
    store.migrate().await?;

    let gmgn = GmgnClient::new(&config.gmgn_base_url, Some(&config.tor_socks_url))?;
    let source: Arc<dyn TokenInfoSource> = Arc::new(gmgn);

    let settings = UpdateSettings {
        active_only: cli.active_only,
        ..UpdateSettings::from_config(&config)
    };
    let mut schedule = LiveTokenSchedule::default();
    let interval = Duration::from_secs(cli.interval_mins.max(1) * 60);

    loop {
        match refresh_live_tokens(&source, &store, &mut schedule, &settings).await {
            Ok((updates, stats)) => {
                info!("{stats}");
                if let Some(path) = &cli.dump {
                    if let Err(e) = dump_updates(path, &updates) {
                        error!(path = %path.display(), error = %e, "Failed to save results to file");
                    }
                }
            }
            Err(e) if cli.once => return Err(e),
            Err(e) => error!(error = %format!("{e:#}"), "Token refresh failed"),
        }

        if cli.once {
            break;
        }

        tokio::select! {
            _ = shutdown_signal() => {
                info!("Token updater stopped by user");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}

fn dump_updates(path: &Path, updates: &[TokenUpdate]) -> Result<()> {
    let json = serde_json::to_string_pretty(updates)?;
    std::fs::write(path, json)?;
    info!(count = updates.len(), path = %path.display(), "Saved updates");
    Ok(())
}
