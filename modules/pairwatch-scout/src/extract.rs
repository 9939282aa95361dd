use std::sync::Arc;

use futures::future::join_all;
use gmgn_client::{pairs_from_body, FetchOutcome};
use pairwatch_common::TokenRecord;
use tracing::{error, info, warn};

use crate::traits::{IdentityRotator, PairFeed};

/// Run `width` new-pairs attempts concurrently, each on a freshly rotated
/// identity, and concatenate the pairs of every successful one. Failed or
/// panicked attempts contribute nothing. Result order is unspecified.
pub async fn fetch_all(
    rotator: &Arc<dyn IdentityRotator>,
    feed: &Arc<dyn PairFeed>,
    width: usize,
) -> Vec<TokenRecord> {
    let handles: Vec<_> = (0..width)
        .map(|attempt| {
            let rotator = Arc::clone(rotator);
            let feed = Arc::clone(feed);
            tokio::spawn(async move {
                if let Err(e) = rotator.rotate().await {
                    warn!(attempt, error = %e, "Identity rotation failed, requesting anyway");
                }
                feed.fetch_pairs().await
            })
        })
        .collect();

    let mut records = Vec::new();
    let mut succeeded = 0;
    for (attempt, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(FetchOutcome::Success(body)) => {
                succeeded += 1;
                records.extend(TokenRecord::from_values(pairs_from_body(body)));
            }
            Ok(FetchOutcome::RetryableFailure(reason)) => {
                warn!(attempt, reason = %reason, "Fetch attempt failed (retryable)");
            }
            Ok(FetchOutcome::FatalFailure(reason)) => {
                warn!(attempt, reason = %reason, "Fetch attempt failed");
            }
            Err(e) => error!(attempt, error = %e, "Fetch attempt task panicked"),
        }
    }

    info!(
        width,
        succeeded,
        raw = records.len(),
        last_attempt_ok = feed.last_attempt_succeeded(),
        "Extraction complete"
    );
    records
}
