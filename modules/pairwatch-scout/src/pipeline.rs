use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use pairwatch_common::Config;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::extract::fetch_all;
use crate::filter::TokenFilter;
use crate::stats::CycleStats;
use crate::traits::{IdentityRotator, PairFeed, TokenSink};
use crate::transform::transform_new_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Verifying,
    Extracting,
    TransformingLoading,
    Sleeping,
    ErrorRecovery,
    Stopped,
}

/// Pacing and fan-out for the extraction loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fetch_width: usize,
    pub load_batch_size: usize,
    pub sleep_min: Duration,
    pub sleep_max: Duration,
    pub error_cooldown: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_width: 5,
            load_batch_size: 50,
            sleep_min: Duration::from_secs(5),
            sleep_max: Duration::from_secs(15),
            error_cooldown: Duration::from_secs(10),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_width: config.fetch_width,
            load_batch_size: config.load_batch_size,
            sleep_min: config.cycle_sleep_min,
            sleep_max: config.cycle_sleep_max,
            error_cooldown: config.error_cooldown,
        }
    }

    fn next_sleep(&self) -> Duration {
        if self.sleep_max <= self.sleep_min {
            return self.sleep_min;
        }
        rand::rng().random_range(self.sleep_min..=self.sleep_max)
    }
}

/// New-token extraction loop: fetch, dedup, transform, load, sleep, repeat.
pub struct Pipeline {
    rotator: Arc<dyn IdentityRotator>,
    feed: Arc<dyn PairFeed>,
    sink: Arc<dyn TokenSink>,
    filter: TokenFilter,
    settings: PipelineSettings,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(
        rotator: Arc<dyn IdentityRotator>,
        feed: Arc<dyn PairFeed>,
        sink: Arc<dyn TokenSink>,
        filter: TokenFilter,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            rotator,
            feed,
            sink,
            filter,
            settings,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn filter(&self) -> &TokenFilter {
        &self.filter
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state");
        self.state = next;
    }

    /// Startup check: the pipeline is pointless without identity rotation.
    pub async fn verify(&mut self) -> Result<()> {
        self.transition(PipelineState::Verifying);
        info!("Verifying Tor connection...");
        self.rotator
            .rotate()
            .await
            .context("Failed to establish initial Tor connection")?;
        info!("Tor connection verified");
        Ok(())
    }

    /// One extract → filter → transform → load pass.
    pub async fn run_cycle(&mut self) -> Result<CycleStats> {
        let started = Instant::now();
        let mut stats = CycleStats::start();

        self.transition(PipelineState::Extracting);
        let raw = fetch_all(&self.rotator, &self.feed, self.settings.fetch_width).await;
        stats.raw = raw.len();

        let fresh = if raw.is_empty() {
            warn!(cycle_id = %stats.cycle_id, "No tokens fetched");
            Vec::new()
        } else {
            self.filter.filter_new(raw)
        };
        stats.new = fresh.len();

        if !fresh.is_empty() {
            self.transition(PipelineState::TransformingLoading);
            let rows = transform_new_tokens(fresh)?;
            stats.loaded = self
                .sink
                .load(rows, self.settings.load_batch_size)
                .await
                .context("Failed to load new tokens")?;
        }

        stats.duration = started.elapsed();
        Ok(stats)
    }

    /// Cycle until `shutdown` resolves. Cycle failures rotate identity, cool
    /// down and carry on; only a failed startup check returns an error.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.verify().await?;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Pipeline stopped by user");
                    break;
                }
                _ = self.step() => {}
            }
        }

        self.transition(PipelineState::Stopped);
        Ok(())
    }

    async fn step(&mut self) {
        match self.run_cycle().await {
            Ok(stats) => {
                info!(new = stats.new, loaded = stats.loaded, "Cycle complete: {stats}");
                self.transition(PipelineState::Sleeping);
                let pause = self.settings.next_sleep();
                debug!(secs = pause.as_secs_f64(), "Sleeping for next cycle");
                tokio::time::sleep(pause).await;
            }
            Err(e) => {
                self.transition(PipelineState::ErrorRecovery);
                error!(error = %format!("{e:#}"), "Error in pipeline");
                if let Err(e) = self.rotator.rotate().await {
                    warn!(error = %e, "Identity rotation during recovery failed");
                }
                tokio::time::sleep(self.settings.error_cooldown).await;
            }
        }
    }
}
