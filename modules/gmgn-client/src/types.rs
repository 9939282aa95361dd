use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a single new-pairs request attempt.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// HTTP 200 with a JSON body.
    Success(Value),
    /// Anti-bot block or transport failure; worth retrying on a fresh identity.
    RetryableFailure(String),
    /// Any other non-200 status.
    FatalFailure(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

/// Response envelope shared by the GMGN endpoints: `{code, msg, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairsData {
    #[serde(default)]
    pub pairs: Vec<Value>,
}

/// Pull `data.pairs` out of a new-pairs body. Anything malformed yields no pairs.
pub fn pairs_from_body(body: Value) -> Vec<Value> {
    serde_json::from_value::<Envelope<PairsData>>(body)
        .ok()
        .and_then(|envelope| envelope.data)
        .map(|data| data.pairs)
        .unwrap_or_default()
}

/// Body for the multi-window token info endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfoRequest<'a> {
    pub chain: &'a str,
    pub addresses: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairs_are_extracted_from_envelope() {
        let body = json!({
            "code": 0,
            "msg": "success",
            "data": { "pairs": [{ "base_address": "0xAA" }, { "base_address": "0xBB" }] }
        });
        let pairs = pairs_from_body(body);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0]["base_address"], "0xAA");
    }

    #[test]
    fn malformed_envelopes_yield_nothing() {
        assert!(pairs_from_body(json!({})).is_empty());
        assert!(pairs_from_body(json!({ "data": null })).is_empty());
        assert!(pairs_from_body(json!({ "data": { "pairs": "nope" } })).is_empty());
        assert!(pairs_from_body(json!([1, 2, 3])).is_empty());
        assert!(pairs_from_body(Value::Null).is_empty());
    }
}
