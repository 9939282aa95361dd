//! Statement building and row shaping for the `tokens` upsert. Pure
//! functions only; everything here runs before a connection is touched.

use std::collections::{HashMap, HashSet};

use pairwatch_common::TokenRow;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, StoreError};

pub const TOKENS_TABLE: &str = "tokens";
pub const KEY_COLUMN: &str = "address";

/// A column of the target table as reported by `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
}

impl TableColumn {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "numeric" | "integer" | "bigint" | "smallint" | "real" | "double precision"
        )
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `INSERT ... SELECT ... FROM jsonb_populate_recordset(...) ON CONFLICT DO UPDATE`
/// over `columns`. `$1` binds the batch as a JSONB array of objects.
pub fn upsert_statement(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != KEY_COLUMN)
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();

    let conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {table} ({column_list}) \
         SELECT {column_list} FROM jsonb_populate_recordset(NULL::{table}, $1) \
         ON CONFLICT ({key}) {conflict}",
        table = quote_ident(table),
        key = quote_ident(KEY_COLUMN),
    )
}

/// Drop fields the table doesn't have.
pub fn retain_known_columns(rows: Vec<TokenRow>, known: &HashSet<String>) -> Vec<TokenRow> {
    rows.into_iter()
        .map(|mut row| {
            row.retain(|key, _| known.contains(key));
            row
        })
        .collect()
}

/// Table columns (in table order) that at least one row carries.
pub fn statement_columns(rows: &[TokenRow], table: &[TableColumn]) -> Vec<String> {
    table
        .iter()
        .filter(|col| rows.iter().any(|row| row.contains_key(&col.name)))
        .map(|col| col.name.clone())
        .collect()
}

/// Collapse rows sharing an address to the last one, keeping the position of
/// its first appearance. Rows without a usable address are dropped.
pub fn dedup_by_address(rows: Vec<TokenRow>) -> Vec<TokenRow> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<TokenRow> = Vec::with_capacity(rows.len());

    for row in rows {
        let address = match row.get(KEY_COLUMN).and_then(Value::as_str) {
            Some(a) if !a.trim().is_empty() => a.to_string(),
            _ => {
                warn!("Dropping row without address");
                continue;
            }
        };
        match positions.get(&address) {
            Some(&idx) => out[idx] = row,
            None => {
                positions.insert(address, out.len());
                out.push(row);
            }
        }
    }
    out
}

/// A blank string in a numeric column would abort the whole transaction
/// server-side; reject it up front with the offending column and address.
pub fn validate_numeric_columns(rows: &[TokenRow], table: &[TableColumn]) -> Result<()> {
    let numeric: Vec<&str> = table
        .iter()
        .filter(|c| c.is_numeric())
        .map(|c| c.name.as_str())
        .collect();

    for row in rows {
        for column in &numeric {
            if let Some(Value::String(s)) = row.get(*column) {
                if s.trim().is_empty() {
                    let address = row
                        .get(KEY_COLUMN)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    return Err(StoreError::InvalidNumeric {
                        column: column.to_string(),
                        address,
                    });
                }
            }
        }
    }
    Ok(())
}
