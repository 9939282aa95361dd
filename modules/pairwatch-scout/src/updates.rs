use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use pairwatch_common::{Config, TokenUpdate};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::retry::RetryPolicy;
use crate::stats::UpdateStats;
use crate::traits::{TokenInfoSource, TokenSink};
use crate::transform::transform_updates;

/// Batching, fan-out and retry settings for a token refresh.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub batch_size: usize,
    pub width: usize,
    pub policy: RetryPolicy,
    pub load_batch_size: usize,
    pub active_only: bool,
}

impl UpdateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.update_batch_size,
            width: config.update_width,
            policy: RetryPolicy {
                max_attempts: config.update_max_retries,
                base_delay: config.update_retry_delay,
                ..RetryPolicy::default()
            },
            load_batch_size: config.load_batch_size,
            active_only: false,
        }
    }
}

/// Read live addresses from the sink, refresh them upstream and write the
/// results back. Returns the refreshed updates along with run counters.
pub async fn refresh_live_tokens(
    source: &Arc<dyn TokenInfoSource>,
    sink: &dyn TokenSink,
    schedule: &mut LiveTokenSchedule,
    settings: &UpdateSettings,
) -> Result<(Vec<TokenUpdate>, UpdateStats)> {
    let started = Instant::now();
    let statuses = schedule.next_statuses();

    let addresses = sink
        .live_addresses(&statuses)
        .await
        .context("Failed to query live tokens")?;
    let mut stats = UpdateStats {
        statuses,
        addresses: addresses.len(),
        ..UpdateStats::default()
    };

    if addresses.is_empty() {
        warn!("No token addresses found");
        stats.duration = started.elapsed();
        return Ok((Vec::new(), stats));
    }

    let mut updates = update_all(
        source,
        &addresses,
        settings.batch_size,
        settings.width,
        settings.policy,
    )
    .await;
    stats.updates = updates.len();

    if settings.active_only {
        updates = retain_active(updates);
    }
    stats.kept = updates.len();

    if !updates.is_empty() {
        let rows = transform_updates(updates.clone())?;
        stats.loaded = sink
            .load(rows, settings.load_batch_size)
            .await
            .context("Failed to load token updates")?;
    }

    stats.duration = started.elapsed();
    Ok((updates, stats))
}

/// Refresh token info for `keys` in consecutive batches of `batch_size`,
/// at most `width` batches in flight. Failed or panicked batches contribute
/// nothing; result order is unspecified.
pub async fn update_all(
    source: &Arc<dyn TokenInfoSource>,
    keys: &[String],
    batch_size: usize,
    width: usize,
    policy: RetryPolicy,
) -> Vec<TokenUpdate> {
    let batches: Vec<Vec<String>> = keys.chunks(batch_size.max(1)).map(<[String]>::to_vec).collect();
    let total = batches.len();

    let results: Vec<_> = stream::iter(batches.into_iter().enumerate().map(|(i, batch)| {
        let source = Arc::clone(source);
        tokio::spawn(async move {
            let batch_num = i + 1;
            info!(batch = batch_num, total, size = batch.len(), "Processing update batch");
            let items = process_batch(source.as_ref(), &batch, &policy).await;
            if items.is_empty() {
                warn!(batch = batch_num, "Update batch returned nothing");
            }
            to_updates(items)
        })
    }))
    .buffer_unordered(width.max(1))
    .collect()
    .await;

    let mut updates = Vec::new();
    for joined in results {
        match joined {
            Ok(batch) => updates.extend(batch),
            Err(e) => error!(error = %e, "Update batch task panicked"),
        }
    }

    info!(keys = keys.len(), batches = total, updates = updates.len(), "Update cycle complete");
    updates
}

/// One batch with bounded retries. A definite client error stops early;
/// exhaustion returns empty. Never fails.
pub async fn process_batch(
    source: &dyn TokenInfoSource,
    addresses: &[String],
    policy: &RetryPolicy,
) -> Vec<Value> {
    for attempt in 1..=policy.max_attempts {
        match source.token_info(addresses).await {
            Ok(items) => return items,
            Err(e) => {
                let status = e.status();
                warn!(attempt, status, error = %e, "Token info attempt failed");

                if !RetryPolicy::should_retry(status) {
                    break;
                }
                if policy.has_attempts_after(attempt) {
                    let delay = policy.delay_for(attempt);
                    info!(attempt, delay_secs = delay.as_secs_f64(), "Waiting before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Vec::new()
}

fn to_updates(items: Vec<Value>) -> Vec<TokenUpdate> {
    items
        .into_iter()
        .filter_map(|data| {
            let address = data.get("address")?.as_str()?.to_string();
            Some(TokenUpdate { address, data })
        })
        .collect()
}

/// Keep updates whose `data.volume` is positive.
pub fn retain_active(updates: Vec<TokenUpdate>) -> Vec<TokenUpdate> {
    let before = updates.len();
    let kept: Vec<_> = updates
        .into_iter()
        .filter(|u| volume(&u.data).is_some_and(|v| v > 0.0))
        .collect();
    info!(kept = kept.len(), total = before, "Filtered active tokens");
    kept
}

fn volume(data: &Value) -> Option<f64> {
    match data.get("volume")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub const STATUS_ALIVE: &str = "alive";
pub const STATUS_FROZEN: &str = "frozen";

/// Which token statuses to refresh: `alive` every time, `frozen` too once
/// per interval. The first call only starts the clock.
#[derive(Debug, Clone)]
pub struct LiveTokenSchedule {
    frozen_every: Duration,
    last_frozen: Option<Instant>,
}

impl Default for LiveTokenSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(12 * 60 * 60))
    }
}

impl LiveTokenSchedule {
    pub fn new(frozen_every: Duration) -> Self {
        Self {
            frozen_every,
            last_frozen: None,
        }
    }

    pub fn next_statuses(&mut self) -> Vec<&'static str> {
        self.statuses_at(Instant::now())
    }

    pub fn statuses_at(&mut self, now: Instant) -> Vec<&'static str> {
        let last = *self.last_frozen.get_or_insert(now);
        if now.saturating_duration_since(last) >= self.frozen_every {
            self.last_frozen = Some(now);
            vec![STATUS_ALIVE, STATUS_FROZEN]
        } else {
            vec![STATUS_ALIVE]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSink, MockTokenInfo};
    use serde_json::json;

    fn settings(active_only: bool) -> UpdateSettings {
        UpdateSettings {
            batch_size: 2,
            width: 2,
            policy: RetryPolicy::immediate(3),
            load_batch_size: 50,
            active_only,
        }
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("addr{i}")).collect()
    }

    #[tokio::test]
    async fn client_error_stops_after_one_attempt() {
        let source = MockTokenInfo::failing(400);
        let items = process_batch(&source, &keys(3), &RetryPolicy::immediate(3)).await;

        assert!(items.is_empty());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_retries_up_to_max() {
        let source = MockTokenInfo::failing(429);
        let items = process_batch(&source, &keys(3), &RetryPolicy::immediate(3)).await;

        assert!(items.is_empty());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let source = MockTokenInfo::echo().fail_first(1, 503);
        let items = process_batch(&source, &keys(2), &RetryPolicy::immediate(3)).await;

        assert_eq!(items.len(), 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn batches_are_merged_and_failures_isolated() {
        let mock = Arc::new(MockTokenInfo::echo().fail_for("addr4", 400));
        let source: Arc<dyn TokenInfoSource> = mock.clone();

        let updates = update_all(&source, &keys(10), 3, 2, RetryPolicy::immediate(3)).await;

        // batches: [0..3) [3..6) [6..9) [9]; the second one fails
        let mut addresses: Vec<_> = updates.iter().map(|u| u.address.as_str()).collect();
        addresses.sort();
        assert_eq!(
            addresses,
            vec!["addr0", "addr1", "addr2", "addr6", "addr7", "addr8", "addr9"]
        );
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test]
    async fn panicked_batch_is_isolated() {
        let mock = Arc::new(MockTokenInfo::echo().panic_for("addr7"));
        let source: Arc<dyn TokenInfoSource> = mock.clone();

        let updates = update_all(&source, &keys(9), 3, 3, RetryPolicy::immediate(3)).await;

        let mut addresses: Vec<_> = updates.iter().map(|u| u.address.as_str()).collect();
        addresses.sort();
        assert_eq!(
            addresses,
            vec!["addr0", "addr1", "addr2", "addr3", "addr4", "addr5"]
        );
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn items_without_address_are_dropped() {
        let updates = to_updates(vec![
            json!({ "address": "a", "volume": 1 }),
            json!({ "symbol": "X" }),
            json!({ "address": 5 }),
        ]);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].address, "a");
    }

    #[test]
    fn only_positive_volume_is_active() {
        let updates = to_updates(vec![
            json!({ "address": "a", "volume": 12.5 }),
            json!({ "address": "b", "volume": 0 }),
            json!({ "address": "c", "volume": "3" }),
            json!({ "address": "d" }),
        ]);
        let active: Vec<_> = retain_active(updates).into_iter().map(|u| u.address).collect();
        assert_eq!(active, vec!["a", "c"]);
    }

    #[test]
    fn frozen_is_included_once_per_interval() {
        let mut schedule = LiveTokenSchedule::new(Duration::from_secs(60));
        let start = Instant::now();

        assert_eq!(schedule.statuses_at(start), vec!["alive"]);
        assert_eq!(schedule.statuses_at(start + Duration::from_secs(30)), vec!["alive"]);
        assert_eq!(
            schedule.statuses_at(start + Duration::from_secs(60)),
            vec!["alive", "frozen"]
        );
        assert_eq!(schedule.statuses_at(start + Duration::from_secs(90)), vec!["alive"]);
        assert_eq!(
            schedule.statuses_at(start + Duration::from_secs(121)),
            vec!["alive", "frozen"]
        );
    }

    #[tokio::test]
    async fn refresh_reads_live_tokens_and_loads_updates() {
        let sink = MockSink::new()
            .with_live("alive", &["a1", "a2", "a3"])
            .with_live("frozen", &["f1"]);
        let source: Arc<dyn TokenInfoSource> = Arc::new(MockTokenInfo::echo());
        let mut schedule = LiveTokenSchedule::default();

        let (updates, stats) = refresh_live_tokens(&source, &sink, &mut schedule, &settings(false))
            .await
            .unwrap();

        assert_eq!(stats.statuses, vec!["alive"]);
        assert_eq!(stats.addresses, 3);
        assert_eq!(updates.len(), 3);
        assert_eq!(stats.loaded, 3);

        let mut loaded: Vec<_> = sink
            .rows()
            .iter()
            .map(|r| r["address"].as_str().unwrap().to_string())
            .collect();
        loaded.sort();
        assert_eq!(loaded, vec!["a1", "a2", "a3"]);
        assert!(sink.rows().iter().all(|r| !r.contains_key("status")));
    }

    #[tokio::test]
    async fn refresh_with_no_live_tokens_loads_nothing() {
        let sink = MockSink::new();
        let source: Arc<dyn TokenInfoSource> = Arc::new(MockTokenInfo::echo());
        let mut schedule = LiveTokenSchedule::default();

        let (updates, stats) = refresh_live_tokens(&source, &sink, &mut schedule, &settings(true))
            .await
            .unwrap();

        assert!(updates.is_empty());
        assert_eq!(stats.addresses, 0);
        assert_eq!(sink.load_calls(), 0);
    }
}
