// Trait seams for the pipeline's external collaborators.
//
// IdentityRotator: fresh Tor circuit (TorController).
// PairFeed: one new-pairs attempt (GmgnClient).
// TokenInfoSource: token-info batch lookup (GmgnClient).
// TokenSink: Postgres load and live-token query (TokenStore).
//
// Mocks for all four live in `testing`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use gmgn_client::{FetchOutcome, GmgnClient, GmgnError};
use pairwatch_common::TokenRow;
use pairwatch_store::TokenStore;
use tor_control::TorController;

#[async_trait]
pub trait IdentityRotator: Send + Sync {
    /// Request a new egress identity and wait until it is usable.
    async fn rotate(&self) -> Result<()>;
}

#[async_trait]
impl IdentityRotator for TorController {
    async fn rotate(&self) -> Result<()> {
        Ok(self.new_identity().await?)
    }
}

#[async_trait]
pub trait PairFeed: Send + Sync {
    async fn fetch_pairs(&self) -> FetchOutcome;

    /// Whether the most recently finished attempt succeeded.
    fn last_attempt_succeeded(&self) -> bool;
}

#[async_trait]
impl PairFeed for GmgnClient {
    async fn fetch_pairs(&self) -> FetchOutcome {
        self.new_pairs().await
    }

    fn last_attempt_succeeded(&self) -> bool {
        GmgnClient::last_attempt_succeeded(self)
    }
}

#[async_trait]
pub trait TokenInfoSource: Send + Sync {
    /// Current info for one batch of addresses. Errors keep the HTTP status
    /// so the caller can decide whether a retry is worthwhile.
    async fn token_info(&self, addresses: &[String]) -> std::result::Result<Vec<Value>, GmgnError>;
}

#[async_trait]
impl TokenInfoSource for GmgnClient {
    async fn token_info(&self, addresses: &[String]) -> std::result::Result<Vec<Value>, GmgnError> {
        GmgnClient::token_info(self, addresses).await
    }
}

#[async_trait]
pub trait TokenSink: Send + Sync {
    /// Upsert rows keyed by address. Returns rows affected.
    async fn load(&self, rows: Vec<TokenRow>, batch_size: usize) -> Result<u64>;

    /// Addresses currently in one of `statuses`.
    async fn live_addresses(&self, statuses: &[&str]) -> Result<Vec<String>>;
}

#[async_trait]
impl TokenSink for TokenStore {
    async fn load(&self, rows: Vec<TokenRow>, batch_size: usize) -> Result<u64> {
        Ok(self.upsert_tokens(rows, batch_size).await?)
    }

    async fn live_addresses(&self, statuses: &[&str]) -> Result<Vec<String>> {
        Ok(TokenStore::live_addresses(self, statuses).await?)
    }
}
