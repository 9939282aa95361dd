use std::collections::HashSet;
use std::path::PathBuf;

use pairwatch_common::TokenRecord;
use tracing::{debug, error, info, warn};

use crate::seen_set::{SeenSet, SeenStore};

/// New-token dedup engine. Owns the seen-set and its file; constructed once
/// at startup and handed to the pipeline by value.
pub struct TokenFilter {
    seen: SeenSet,
    store: SeenStore,
}

impl TokenFilter {
    /// Load the persisted seen-set from `path`, capped at `max_tracked` keys.
    pub fn open(path: impl Into<PathBuf>, max_tracked: usize) -> Self {
        let store = SeenStore::new(path);
        let seen = store.load(max_tracked);
        Self { seen, store }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Records whose identity key was not seen before this call, one per key,
    /// in input order. Every usable key of the batch is then recorded as seen
    /// and the set is written to disk before returning.
    pub fn filter_new(&mut self, records: Vec<TokenRecord>) -> Vec<TokenRecord> {
        let total = records.len();
        let mut batch_keys: Vec<String> = Vec::with_capacity(total);
        let mut in_batch: HashSet<String> = HashSet::with_capacity(total);
        let mut fresh = Vec::new();

        for record in records {
            let Some(key) = record.identity_key() else {
                warn!(record = ?record.get("base_address"), "Skipping token with missing or invalid base_address");
                continue;
            };
            if !in_batch.insert(key.clone()) {
                debug!(key = %key, "Skipping duplicate token in batch");
                continue;
            }
            if !self.seen.contains(&key) {
                fresh.push(record);
            }
            batch_keys.push(key);
        }

        for key in &batch_keys {
            self.seen.insert(key);
        }

        if let Err(e) = self.store.save(&self.seen) {
            error!(path = %self.store.path().display(), error = %e, "Failed to save seen addresses");
        }

        info!(
            new = fresh.len(),
            total,
            tracked = self.seen.len(),
            capacity = self.seen.capacity(),
            "Filtered new tokens"
        );
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn records(values: Vec<Value>) -> Vec<TokenRecord> {
        values
            .into_iter()
            .map(|v| TokenRecord::try_from(v).unwrap())
            .collect()
    }

    fn filter_in(dir: &tempfile::TempDir, max: usize) -> TokenFilter {
        TokenFilter::open(dir.path().join("seen.json"), max)
    }

    #[test]
    fn mixed_case_batch_keeps_first_spelling_and_tracks_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = filter_in(&dir, 100);

        let out = filter.filter_new(records(vec![
            json!({ "base_address": "0xAA" }),
            json!({ "base_address": "0xaa " }),
            json!({ "base_address": "0xBB" }),
        ]));

        let kept: Vec<_> = out.iter().map(|r| r.get("base_address").cloned()).collect();
        assert_eq!(kept, vec![Some(json!("0xAA")), Some(json!("0xBB"))]);
        assert_eq!(filter.seen().iter().collect::<Vec<_>>(), vec!["0xaa", "0xbb"]);

        let saved: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("seen.json")).unwrap())
                .unwrap();
        assert_eq!(saved, vec!["0xaa", "0xbb"]);
    }

    #[test]
    fn batch_duplicates_collapse_to_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = filter_in(&dir, 100);

        let out = filter.filter_new(records(vec![
            json!({ "base_address": "0xAA", "n": 1 }),
            json!({ "base_address": "0xaa", "n": 2 }),
        ]));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("n"), Some(&json!(1)));
    }

    #[test]
    fn records_without_key_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = filter_in(&dir, 100);

        let out = filter.filter_new(records(vec![
            json!({ "symbol": "NOKEY" }),
            json!({ "base_address": "   " }),
            json!({ "base_address": null }),
            json!({ "base_address": 12 }),
            json!({ "base_address": "0xCC" }),
        ]));

        assert_eq!(out.len(), 1);
        assert_eq!(filter.seen().len(), 1);
    }

    #[test]
    fn second_pass_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = filter_in(&dir, 100);
        let batch = vec![json!({ "base_address": "0x1" }), json!({ "base_address": "0x2" })];

        assert_eq!(filter.filter_new(records(batch.clone())).len(), 2);
        assert!(filter.filter_new(records(batch)).is_empty());
    }

    #[test]
    fn seen_set_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut filter = filter_in(&dir, 100);
            filter.filter_new(records(vec![json!({ "base_address": "0xAB" })]));
        }

        let mut reopened = filter_in(&dir, 100);
        assert!(reopened
            .filter_new(records(vec![json!({ "base_address": " 0xab" })]))
            .is_empty());
    }

    #[test]
    fn tracking_is_bounded_to_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = filter_in(&dir, 50);

        for pass in 0..3 {
            let batch = (0..30)
                .map(|i| json!({ "base_address": format!("0x{pass}-{i}") }))
                .collect();
            filter.filter_new(records(batch));
        }

        assert_eq!(filter.seen().len(), 50);
        assert!(filter.seen().contains("0x2-29"));
        assert!(filter.seen().contains("0x1-10"));
        assert!(!filter.seen().contains("0x1-9"));
        assert!(!filter.seen().contains("0x0-29"));
    }
}
