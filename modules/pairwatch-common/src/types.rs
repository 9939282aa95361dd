use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::RecordError;

/// Field carrying the dedup identity of a new-pairs record.
pub const IDENTITY_FIELD: &str = "base_address";

/// One flat, typed row ready for the `tokens` table.
pub type TokenRow = Map<String, Value>;

/// Normalize an address for use as an identity key: trimmed, lower-cased.
/// Returns `None` when nothing is left.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// A raw pair record as received from the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenRecord(Map<String, Value>);

impl TokenRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Normalized `base_address`, or `None` if absent, non-string or blank.
    pub fn identity_key(&self) -> Option<String> {
        self.0
            .get(IDENTITY_FIELD)
            .and_then(Value::as_str)
            .and_then(normalize_address)
    }

    /// Convert upstream values, dropping (and logging) anything that isn't an object.
    pub fn from_values(values: Vec<Value>) -> Vec<TokenRecord> {
        values
            .into_iter()
            .filter_map(|value| match TokenRecord::try_from(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed pair record");
                    None
                }
            })
            .collect()
    }
}

impl TryFrom<Value> for TokenRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(TokenRecord(map)),
            Value::Null => Err(RecordError::NotAnObject("null")),
            Value::Bool(_) => Err(RecordError::NotAnObject("bool")),
            Value::Number(_) => Err(RecordError::NotAnObject("number")),
            Value::String(_) => Err(RecordError::NotAnObject("string")),
            Value::Array(_) => Err(RecordError::NotAnObject("array")),
        }
    }
}

impl From<TokenRecord> for Value {
    fn from(record: TokenRecord) -> Self {
        Value::Object(record.0)
    }
}

/// Fresh token-info payload for one known address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUpdate {
    pub address: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> TokenRecord {
        TokenRecord::try_from(value).unwrap()
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_address("  0xAbC \n"), Some("0xabc".to_string()));
        assert_eq!(normalize_address("   "), None);
        assert_eq!(normalize_address(""), None);
    }

    #[test]
    fn identity_key_requires_a_usable_string() {
        assert_eq!(
            record(json!({ "base_address": " 0xAA " })).identity_key(),
            Some("0xaa".to_string())
        );
        assert_eq!(record(json!({ "base_address": "" })).identity_key(), None);
        assert_eq!(record(json!({ "base_address": 42 })).identity_key(), None);
        assert_eq!(record(json!({ "base_address": null })).identity_key(), None);
        assert_eq!(record(json!({ "symbol": "PEPE" })).identity_key(), None);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(TokenRecord::try_from(json!([1, 2])).is_err());
        assert!(TokenRecord::try_from(json!("0xAA")).is_err());

        let records = TokenRecord::from_values(vec![
            json!({ "base_address": "0xAA" }),
            json!(null),
            json!(7),
        ]);
        assert_eq!(records.len(), 1);
    }
}
