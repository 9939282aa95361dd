// Test mocks for the pipeline seams.
//
// - MockRotator (IdentityRotator): counts rotations, optionally fails
// - MockFeed (PairFeed): scripted FetchOutcomes, then RetryableFailure;
//   optionally panics on one call
// - MockTokenInfo (TokenInfoSource): echoes addresses, scripted failures
//   or a panic
// - MockSink (TokenSink): in-memory rows and live addresses

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use gmgn_client::{FetchOutcome, GmgnError};
use pairwatch_common::TokenRow;

use crate::traits::{IdentityRotator, PairFeed, TokenInfoSource, TokenSink};

/// New-pairs envelope holding one pair per address.
pub fn pairs_body(addresses: &[&str]) -> Value {
    let pairs: Vec<Value> = addresses
        .iter()
        .map(|a| {
            json!({
                "base_address": a,
                "pool_type_str": "pump",
                "base_token_info": { "symbol": format!("SYM{}", a.trim()) }
            })
        })
        .collect();
    json!({ "code": 0, "msg": "success", "data": { "pairs": pairs } })
}

// ---------------------------------------------------------------------------
// MockRotator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockRotator {
    rotations: AtomicUsize,
    fail: bool,
}

impl MockRotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            rotations: AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Rotation attempts, failed ones included.
    pub fn rotations(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityRotator for MockRotator {
    async fn rotate(&self) -> Result<()> {
        self.rotations.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("control port unreachable");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockFeed
// ---------------------------------------------------------------------------

pub struct MockFeed {
    outcomes: Mutex<VecDeque<FetchOutcome>>,
    calls: AtomicUsize,
    panic_on_call: Option<usize>,
    last_success: AtomicBool,
}

impl MockFeed {
    pub fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            panic_on_call: None,
            last_success: AtomicBool::new(false),
        }
    }

    /// Panic on the `n`th call (1-based) without consuming an outcome.
    pub fn panicking_on(mut self, n: usize) -> Self {
        self.panic_on_call = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairFeed for MockFeed {
    async fn fetch_pairs(&self) -> FetchOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_call == Some(call) {
            panic!("mock feed panic on call {call}");
        }
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FetchOutcome::RetryableFailure("no scripted outcome".into()));
        self.last_success
            .store(outcome.is_success(), Ordering::SeqCst);
        outcome
    }

    fn last_attempt_succeeded(&self) -> bool {
        self.last_success.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// MockTokenInfo
// ---------------------------------------------------------------------------

/// Returns `{address, symbol, volume}` per requested address unless a
/// failure rule matches.
pub struct MockTokenInfo {
    always_fail: Option<u16>,
    fail_first: Mutex<(usize, u16)>,
    fail_for: HashMap<String, u16>,
    panic_for: Option<String>,
    calls: AtomicUsize,
}

impl MockTokenInfo {
    pub fn echo() -> Self {
        Self {
            always_fail: None,
            fail_first: Mutex::new((0, 0)),
            fail_for: HashMap::new(),
            panic_for: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            always_fail: Some(status),
            ..Self::echo()
        }
    }

    /// Fail the first `n` calls with `status`.
    pub fn fail_first(self, n: usize, status: u16) -> Self {
        *self.fail_first.lock().unwrap() = (n, status);
        self
    }

    /// Fail any batch containing `address` with `status`.
    pub fn fail_for(mut self, address: &str, status: u16) -> Self {
        self.fail_for.insert(address.to_string(), status);
        self
    }

    /// Panic on any batch containing `address`.
    pub fn panic_for(mut self, address: &str) -> Self {
        self.panic_for = Some(address.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn api_error(status: u16) -> GmgnError {
    GmgnError::Api {
        status,
        message: format!("mock HTTP {status}"),
    }
}

#[async_trait]
impl TokenInfoSource for MockTokenInfo {
    async fn token_info(&self, addresses: &[String]) -> std::result::Result<Vec<Value>, GmgnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(target) = &self.panic_for {
            if addresses.contains(target) {
                panic!("mock token info panic for {target}");
            }
        }
        if let Some(status) = self.always_fail {
            return Err(api_error(status));
        }
        {
            let mut first = self.fail_first.lock().unwrap();
            if first.0 > 0 {
                first.0 -= 1;
                return Err(api_error(first.1));
            }
        }
        if let Some(status) = addresses.iter().find_map(|a| self.fail_for.get(a)) {
            return Err(api_error(*status));
        }

        Ok(addresses
            .iter()
            .map(|a| json!({ "address": a, "symbol": "MOCK", "volume": 1 }))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockSink {
    rows: Mutex<Vec<TokenRow>>,
    live: HashMap<String, Vec<String>>,
    failures_left: AtomicUsize,
    load_calls: AtomicUsize,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` loads.
    pub fn failing_loads(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Addresses returned for `status`.
    pub fn with_live(mut self, status: &str, addresses: &[&str]) -> Self {
        self.live.insert(
            status.to_string(),
            addresses.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn rows(&self) -> Vec<TokenRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSink for MockSink {
    async fn load(&self, rows: Vec<TokenRow>, _batch_size: usize) -> Result<u64> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("mock load failure");
        }
        let count = rows.len() as u64;
        self.rows.lock().unwrap().extend(rows);
        Ok(count)
    }

    async fn live_addresses(&self, statuses: &[&str]) -> Result<Vec<String>> {
        Ok(statuses
            .iter()
            .filter_map(|s| self.live.get(*s))
            .flatten()
            .cloned()
            .collect())
    }
}
