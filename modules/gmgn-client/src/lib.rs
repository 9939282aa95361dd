pub mod error;
pub mod fingerprint;
pub mod types;

pub use error::{GmgnError, Result};
pub use fingerprint::{BrowserAgents, ClientFingerprint, UserAgentSource};
pub use types::{pairs_from_body, Envelope, FetchOutcome, PairsData, TokenInfoRequest};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://gmgn.ai";

const NEW_PAIRS_PATH: &str = "/defi/quotation/v1/pairs/sol/new_pairs/5m";
const TOKEN_INFO_PATH: &str = "/api/v1/mutil_window_token_info";

const NEW_PAIRS_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_INFO_TIMEOUT: Duration = Duration::from_secs(45);

/// Pairs requested per new-pairs call.
const NEW_PAIRS_LIMIT: &str = "100";

pub struct GmgnClient {
    client: reqwest::Client,
    base_url: String,
    agents: Box<dyn UserAgentSource>,
    last_success: AtomicBool,
}

impl GmgnClient {
    /// Build a client. `proxy` is a proxy URL such as `socks5h://127.0.0.1:9050`.
    pub fn new(base_url: &str, proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| GmgnError::Setup(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        // No idle reuse: a request after NEWNYM must open a new SOCKS stream
        // to land on the new circuit.
        let client = builder
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| GmgnError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            agents: Box::new(BrowserAgents),
            last_success: AtomicBool::new(false),
        })
    }

    /// Whether the most recent new-pairs attempt returned 200.
    pub fn last_attempt_succeeded(&self) -> bool {
        self.last_success.load(Ordering::Relaxed)
    }

    /// One new-pairs request with a fresh fingerprint, classified into a [`FetchOutcome`].
    pub async fn new_pairs(&self) -> FetchOutcome {
        let fingerprint = ClientFingerprint::random(self.agents.as_ref());
        let url = format!("{}{}", self.base_url, NEW_PAIRS_PATH);

        let mut query = fingerprint.query_params();
        query.extend([
            ("limit", NEW_PAIRS_LIMIT.to_string()),
            ("orderby", "open_timestamp".to_string()),
            ("direction", "desc".to_string()),
            ("period", "5m".to_string()),
        ]);

        let result = self
            .client
            .get(&url)
            .headers(self.browser_headers(&fingerprint, "/sol/tokens/new"))
            .header(header::PRAGMA, "no-cache")
            .header(header::CACHE_CONTROL, "no-cache")
            .query(&query)
            .timeout(NEW_PAIRS_TIMEOUT)
            .send()
            .await;

        let outcome = match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                info!(status, "New pairs response");
                let body = if status == 200 {
                    resp.json::<Value>().await.map_err(|e| e.to_string())
                } else {
                    Err(String::new())
                };
                classify(status, body)
            }
            Err(e) => FetchOutcome::RetryableFailure(format!("request failed: {e}")),
        };

        match &outcome {
            FetchOutcome::Success(_) => {}
            FetchOutcome::RetryableFailure(reason) => warn!(reason = %reason, "New pairs attempt failed"),
            FetchOutcome::FatalFailure(reason) => warn!(reason = %reason, "New pairs attempt rejected"),
        }
        self.last_success
            .store(outcome.is_success(), Ordering::Relaxed);
        outcome
    }

    /// Fetch current token info for up to one batch of addresses.
    pub async fn token_info(&self, addresses: &[String]) -> Result<Vec<Value>> {
        let fingerprint = ClientFingerprint::random(self.agents.as_ref());
        let url = format!("{}{}", self.base_url, TOKEN_INFO_PATH);

        // Pacing between batches so parallel workers don't fire in lockstep.
        let pause = Duration::from_millis(rand::rng().random_range(500..=1500));
        tokio::time::sleep(pause).await;

        let resp = self
            .client
            .post(&url)
            .headers(self.browser_headers(&fingerprint, "/sol/tokens"))
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&TokenInfoRequest {
                chain: "sol",
                addresses,
            })
            .timeout(TOKEN_INFO_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GmgnError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let envelope: Envelope<Vec<Value>> = resp.json().await?;
        Ok(envelope.data.unwrap_or_default())
    }

    fn browser_headers(&self, fingerprint: &ClientFingerprint, referer_path: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_static(DEFAULT_BASE_URL));
        if let Ok(referer) = HeaderValue::from_str(&format!("{DEFAULT_BASE_URL}{referer_path}")) {
            headers.insert(header::REFERER, referer);
        }
        if let Ok(agent) = HeaderValue::from_str(&fingerprint.user_agent) {
            headers.insert(header::USER_AGENT, agent);
        }
        if let Ok(lang) = HeaderValue::from_str(&format!("{},en;q=0.9", fingerprint.app_lang)) {
            headers.insert(header::ACCEPT_LANGUAGE, lang);
        }
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        headers
    }
}

/// 200 → success (unparseable body is retryable), 403 → retryable, other → fatal.
pub(crate) fn classify(status: u16, body: std::result::Result<Value, String>) -> FetchOutcome {
    match status {
        200 => match body {
            Ok(json) => FetchOutcome::Success(json),
            Err(e) => FetchOutcome::RetryableFailure(format!("invalid JSON body: {e}")),
        },
        403 => FetchOutcome::RetryableFailure("HTTP 403 Forbidden".to_string()),
        other => FetchOutcome::FatalFailure(format!("HTTP {other}")),
    }
}
