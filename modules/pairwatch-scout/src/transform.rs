//! Reshape raw GMGN records into flat rows for the `tokens` table.
//!
//! Nested objects are flattened with `_`, redundant upstream fields are
//! dropped or folded together, columns are renamed to the table's names,
//! then values are coerced: timestamps to RFC 3339, numerics to decimal
//! strings, flags to booleans.

use chrono::{DateTime, Utc};
use pairwatch_common::{TokenRecord, TokenRow, TokenUpdate};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::TransformError;

const DROP_COLUMNS: &[&str] = &[
    "id",
    "pool_type",
    "quote_address",
    "base_token_info_launchpad_status",
    "base_token_info_buy_tax",
    "base_token_info_sell_tax",
    "base_token_info_is_honeypot",
    "base_token_info_renounced",
    "base_token_info_dexscr_ad",
    "base_token_info_dexscr_update_link",
    "base_token_info_is_open_source",
    "base_token_info_lockInfo",
    "base_token_info_progress",
];

/// `(target, source)`: fill a missing target from source, then drop source.
const COMBINE_COLUMNS: &[(&str, &str)] = &[
    ("pool_type_str", "launchpad"),
    ("base_address", "base_token_info_address"),
    ("base_token_info_burn_status", "burn_status"),
    ("base_token_info_burn_ratio", "burn_ratio"),
    ("base_token_info_liquidity", "liquidity"),
    ("address", "base_token_info_pool_id"),
    ("creation_timestamp", "base_token_info_creation_timestamp"),
];

const RENAME_COLUMNS: &[(&str, &str)] = &[
    ("address", "pair_address"),
    ("base_address", "address"),
    ("pool_type_str", "platform"),
    ("base_token_info_symbol", "symbol"),
    ("base_token_info_name", "name"),
    ("base_token_info_logo", "logo"),
    ("base_token_info_total_supply", "total_supply"),
    ("base_token_info_holder_count", "holder_count"),
    ("base_token_info_sniper_count", "sniper_count"),
    ("base_token_info_price_change_percent1m", "price_change_1m"),
    ("base_token_info_price_change_percent5m", "price_change_5m"),
    ("base_token_info_price_change_percent1h", "price_change_1h"),
    ("base_token_info_price", "price"),
    ("base_token_info_is_show_alert", "has_alert"),
    ("base_token_info_hot_level", "hot_level"),
    ("base_token_info_liquidity", "liquidity"),
    ("base_token_info_top_10_holder_rate", "top_10_holder_rate"),
    ("base_token_info_renounced_mint", "renounced_mint"),
    ("base_token_info_renounced_freeze_account", "renounced_freeze_account"),
    ("base_token_info_social_links_twitter_username", "twitter_username"),
    ("base_token_info_social_links_website", "website"),
    ("base_token_info_social_links_telegram", "telegram"),
    ("base_token_info_rug_ratio", "rug_ratio"),
    ("base_token_info_is_wash_trading", "is_wash_trading"),
    ("base_token_info_creator_balance_rate", "creator_balance_rate"),
    ("base_token_info_rat_trader_amount_rate", "rat_trader_amount_rate"),
    ("base_token_info_creator_token_status", "creator_token_status"),
    ("base_token_info_bluechip_owner_percentage", "bluechip_owner_percentage"),
    ("base_token_info_smart_degen_count", "smart_degen_count"),
    ("base_token_info_renowned_count", "renowned_count"),
    ("base_token_info_volume", "volume"),
    ("base_token_info_swaps", "swaps"),
    ("base_token_info_buys", "buys"),
    ("base_token_info_sells", "sells"),
    ("base_token_info_burn_status", "burn_status"),
    ("base_token_info_burn_ratio", "burn_ratio"),
    ("base_token_info_dev_token_burn_amount", "dev_token_burn_amount"),
    ("base_token_info_dev_token_burn_ratio", "dev_token_burn_ratio"),
    ("base_token_info_cto_flag", "cto_flag"),
    ("base_token_info_twitter_change_flag", "twitter_change_flag"),
    ("base_token_info_market_cap", "market_cap"),
    ("base_token_info_creator_close", "creator_close"),
    ("base_token_info_biggest_pool_address", "biggest_pool_address"),
];

const TIMESTAMP_COLUMNS: &[&str] = &["open_timestamp", "creation_timestamp"];

const NUMERIC_COLUMNS: &[&str] = &[
    "price",
    "liquidity",
    "volume",
    "market_cap",
    "quote_reserve",
    "initial_liquidity",
    "initial_quote_reserve",
    "total_supply",
    "holder_count",
    "sniper_count",
    "hot_level",
    "top_10_holder_rate",
    "rug_ratio",
    "creator_balance_rate",
    "rat_trader_amount_rate",
    "bluechip_owner_percentage",
    "smart_degen_count",
    "renowned_count",
    "bot_degen_count",
    "swaps",
    "buys",
    "sells",
    "dev_token_burn_amount",
    "dev_token_burn_ratio",
    "burn_ratio",
    "cto_flag",
    "twitter_change_flag",
    "price_change_1m",
    "price_change_5m",
    "price_change_1h",
];

const BOOL_COLUMNS: &[&str] = &[
    "has_alert",
    "is_wash_trading",
    "renounced_mint",
    "renounced_freeze_account",
    "creator_close",
];

const REQUIRED_COLUMNS: &[&str] = &["address", "status", "symbol", "platform"];

pub const DEFAULT_STATUS: &str = "alive";

/// Flatten nested objects into `parent_child` keys. Arrays stay as values.
pub fn flatten(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, None, map);
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let key = match prefix {
            Some(prefix) => format!("{prefix}_{key}"),
            None => key,
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&key), inner),
            other => {
                out.insert(key, other);
            }
        }
    }
}

/// Turn newly discovered pair records into `tokens` rows with status `alive`.
pub fn transform_new_tokens(records: Vec<TokenRecord>) -> Result<Vec<TokenRow>, TransformError> {
    if records.is_empty() {
        warn!("No records to transform");
        return Ok(Vec::new());
    }

    let mut rows: Vec<TokenRow> = records
        .into_iter()
        .map(|record| {
            let mut row = flatten(record.into_fields());
            for column in DROP_COLUMNS {
                row.remove(*column);
            }
            combine_columns(&mut row);
            rename_columns(&mut row);
            coerce_row(&mut row);
            row.insert("status".to_string(), Value::String(DEFAULT_STATUS.to_string()));
            row
        })
        .filter_map(clean_address)
        .collect();

    require_columns(&mut rows, REQUIRED_COLUMNS)?;

    info!(rows = rows.len(), "Transformed new tokens");
    Ok(rows)
}

/// Turn token-info updates into partial `tokens` rows. Status is left alone
/// so a stored status survives the refresh.
pub fn transform_updates(updates: Vec<TokenUpdate>) -> Result<Vec<TokenRow>, TransformError> {
    let mut rows: Vec<TokenRow> = updates
        .into_iter()
        .filter_map(|update| {
            let mut row = match update.data {
                Value::Object(map) => flatten(map),
                _ => Map::new(),
            };
            row.remove("status");
            row.insert("address".to_string(), Value::String(update.address));
            coerce_row(&mut row);
            clean_address(row)
        })
        .collect();

    require_columns(&mut rows, &["address"])?;

    info!(rows = rows.len(), "Transformed token updates");
    Ok(rows)
}

fn combine_columns(row: &mut TokenRow) {
    for (target, source) in COMBINE_COLUMNS {
        if let Some(value) = row.remove(*source) {
            let target_empty = row.get(*target).map_or(true, Value::is_null);
            if target_empty {
                row.insert(target.to_string(), value);
            }
        }
    }
}

fn rename_columns(row: &mut TokenRow) {
    // Renames are simultaneous: `address` -> `pair_address` must not see the
    // value that `base_address` -> `address` produces.
    let mut renamed = Vec::new();
    for (from, to) in RENAME_COLUMNS {
        if let Some(value) = row.remove(*from) {
            renamed.push((*to, value));
        }
    }
    for (to, value) in renamed {
        row.insert(to.to_string(), value);
    }
}

fn coerce_row(row: &mut TokenRow) {
    for column in TIMESTAMP_COLUMNS {
        if let Some(value) = row.get_mut(*column) {
            *value = to_timestamp(value);
        }
    }
    for column in NUMERIC_COLUMNS {
        if let Some(value) = row.get_mut(*column) {
            *value = to_decimal(column, value);
        }
    }
    for column in BOOL_COLUMNS {
        if let Some(value) = row.get_mut(*column) {
            *value = Value::Bool(to_bool(value));
        }
    }
}

fn clean_address(mut row: TokenRow) -> Option<TokenRow> {
    let address = row.get("address").and_then(Value::as_str)?.trim().to_string();
    if address.is_empty() {
        return None;
    }
    row.insert("address".to_string(), Value::String(address));
    Some(row)
}

/// Every required column must appear in at least one row; rows lacking one
/// get an empty string.
fn require_columns(rows: &mut [TokenRow], required: &[&str]) -> Result<(), TransformError> {
    if rows.is_empty() {
        return Ok(());
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|col| !rows.iter().any(|row| row.contains_key(**col)))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(TransformError::MissingColumns(missing));
    }

    for row in rows.iter_mut() {
        for col in required {
            let entry = row.entry(col.to_string()).or_insert(Value::Null);
            if entry.is_null() {
                *entry = Value::String(String::new());
            }
        }
    }
    Ok(())
}

/// Unix seconds (number or numeric string) or an RFC 3339 string; anything
/// else becomes null.
fn to_timestamp(value: &Value) -> Value {
    let parsed: Option<DateTime<Utc>> = match value {
        Value::Number(n) => n.as_f64().and_then(from_unix_secs),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .and_then(from_unix_secs)
                .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)))
        }
        _ => None,
    };
    parsed.map_or(Value::Null, |dt| Value::String(dt.to_rfc3339()))
}

fn from_unix_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn to_decimal(column: &str, value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Number(n) => Value::String(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("nan") {
                return Value::Null;
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Value::String(s.to_string()),
                _ => {
                    warn!(column, value = s, "Invalid numeric value");
                    Value::Null
                }
            }
        }
        other => {
            warn!(column, value = %other, "Invalid numeric value");
            Value::Null
        }
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "t"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> TokenRecord {
        TokenRecord::try_from(value).unwrap()
    }

    fn sample_pair() -> Value {
        json!({
            "id": 991,
            "address": "PoolAddr",
            "base_address": " MintAddr ",
            "quote_address": "So111",
            "pool_type": 1,
            "pool_type_str": null,
            "launchpad": "pump",
            "open_timestamp": 1_700_000_000,
            "initial_liquidity": 12.5,
            "base_token_info": {
                "symbol": "PEPE",
                "name": "Pepe",
                "price": "0.0001",
                "volume": "",
                "holder_count": 42,
                "is_show_alert": "Yes",
                "renounced_mint": 1,
                "creator_close": "nope",
                "liquidity": "900",
                "creation_timestamp": "1700000100",
                "social_links": { "twitter_username": "pepe" },
                "buy_tax": "0",
                "progress": 0.5
            }
        })
    }

    #[test]
    fn flatten_joins_nested_keys() {
        let map = match json!({ "a": { "b": { "c": 1 } }, "d": [1, 2] }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let flat = flatten(map);
        assert_eq!(flat["a_b_c"], json!(1));
        assert_eq!(flat["d"], json!([1, 2]));
    }

    #[test]
    fn new_pair_becomes_table_row() {
        let rows = transform_new_tokens(vec![record(sample_pair())]).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row["address"], "MintAddr");
        assert_eq!(row["pair_address"], "PoolAddr");
        assert_eq!(row["platform"], "pump");
        assert_eq!(row["symbol"], "PEPE");
        assert_eq!(row["status"], "alive");
        assert_eq!(row["twitter_username"], "pepe");

        assert_eq!(row["price"], "0.0001");
        assert_eq!(row["holder_count"], "42");
        assert_eq!(row["initial_liquidity"], "12.5");
        assert_eq!(row["liquidity"], "900");
        assert_eq!(row["volume"], Value::Null);

        assert_eq!(row["has_alert"], true);
        assert_eq!(row["renounced_mint"], true);
        assert_eq!(row["creator_close"], false);

        assert_eq!(row["open_timestamp"], "2023-11-14T22:13:20+00:00");
        assert_eq!(row["creation_timestamp"], "2023-11-14T22:15:00+00:00");

        for dropped in ["id", "pool_type", "quote_address", "launchpad", "base_address"] {
            assert!(!row.contains_key(dropped), "{dropped} should be gone");
        }
        assert!(!row.contains_key("base_token_info_buy_tax"));
        assert!(!row.contains_key("base_token_info_progress"));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let err = transform_new_tokens(vec![record(json!({
            "base_address": "0xAA",
            "pool_type_str": "raydium"
        }))])
        .unwrap_err();

        match err {
            TransformError::MissingColumns(cols) => assert_eq!(cols, vec!["symbol"]),
        }
    }

    #[test]
    fn required_columns_are_filled_per_row() {
        let rows = transform_new_tokens(vec![
            record(json!({ "base_address": "0x1", "pool_type_str": "pump", "base_token_info": { "symbol": "A" } })),
            record(json!({ "base_address": "0x2", "pool_type_str": "pump" })),
        ])
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["symbol"], "");
    }

    #[test]
    fn rows_without_address_are_dropped() {
        let rows = transform_new_tokens(vec![
            record(json!({ "base_address": "0x1", "pool_type_str": "pump", "base_token_info": { "symbol": "A" } })),
            record(json!({ "pool_type_str": "pump", "base_token_info": { "symbol": "B" } })),
        ])
        .unwrap();

        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn updates_keep_address_and_skip_status() {
        let rows = transform_updates(vec![TokenUpdate {
            address: "Mint1".to_string(),
            data: json!({ "address": "Mint1", "price": 1.25, "volume": "10", "symbol": "X" }),
        }])
        .unwrap();

        assert_eq!(rows[0]["address"], "Mint1");
        assert_eq!(rows[0]["price"], "1.25");
        assert_eq!(rows[0]["volume"], "10");
        assert!(!rows[0].contains_key("status"));
    }

    #[test]
    fn empty_input_is_not_an_error() {
        assert!(transform_new_tokens(Vec::new()).unwrap().is_empty());
        assert!(transform_updates(Vec::new()).unwrap().is_empty());
    }
}
