// Postgres persistence for discovered tokens.

use std::collections::HashSet;

use pairwatch_common::{Config, TokenRow};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::sql::{self, TableColumn, KEY_COLUMN, TOKENS_TABLE};

/// Rows fetched per page by [`TokenStore::live_addresses`].
pub const LIVE_PAGE_SIZE: i64 = 1000;

#[derive(Clone)]
pub struct TokenStore {
    pool: PgPool,
}

impl TokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database fields of `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.db_host)
            .port(config.db_port)
            .username(&config.db_user)
            .password(&config.db_password)
            .database(&config.db_name);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(host = %config.db_host, db = %config.db_name, "Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Columns of the `tokens` table, in ordinal order.
    pub async fn table_columns(&self) -> Result<Vec<TableColumn>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(TOKENS_TABLE)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(StoreError::MissingTable(TOKENS_TABLE.to_string()));
        }

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| TableColumn { name, data_type })
            .collect())
    }

    /// Upsert rows keyed by address in batches of `batch_size`, all inside one
    /// transaction. Unknown fields are dropped; a blank numeric value fails
    /// the whole load before anything is written. Returns rows affected.
    pub async fn upsert_tokens(&self, rows: Vec<TokenRow>, batch_size: usize) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let table = self.table_columns().await?;
        let known: HashSet<String> = table.iter().map(|c| c.name.clone()).collect();

        let rows = sql::dedup_by_address(sql::retain_known_columns(rows, &known));
        sql::validate_numeric_columns(&rows, &table)?;

        let columns = sql::statement_columns(&rows, &table);
        if !columns.iter().any(|c| c == KEY_COLUMN) {
            warn!("No rows carry an address, nothing to load");
            return Ok(0);
        }
        let statement = sql::upsert_statement(TOKENS_TABLE, &columns);

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for (i, batch) in rows.chunks(batch_size.max(1)).enumerate() {
            match sqlx::query(&statement)
                .bind(Json(batch))
                .execute(&mut *tx)
                .await
            {
                Ok(result) => {
                    affected += result.rows_affected();
                    info!(batch = i + 1, rows = batch.len(), "Upserted token batch");
                }
                Err(e) => {
                    warn!(batch = i + 1, error = %e, "Token batch failed, rolling back");
                    return Err(e.into());
                }
            }
        }
        tx.commit().await?;

        info!(rows = rows.len(), affected, "Loaded tokens");
        Ok(affected)
    }

    /// Addresses whose status is one of `statuses`, newest first, read in
    /// pages of [`LIVE_PAGE_SIZE`].
    pub async fn live_addresses(&self, statuses: &[&str]) -> Result<Vec<String>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let mut addresses = Vec::new();
        let mut offset = 0i64;

        loop {
            let page = sqlx::query_scalar::<_, String>(
                r#"
                SELECT address FROM tokens
                WHERE status = ANY($1)
                ORDER BY creation_timestamp DESC NULLS LAST, address
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(&statuses)
            .bind(LIVE_PAGE_SIZE)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            addresses.extend(page);
            offset += LIVE_PAGE_SIZE;

            info!(fetched, total = addresses.len(), "Fetched live addresses");
            if (fetched as i64) < LIVE_PAGE_SIZE {
                break;
            }
        }

        info!(statuses = ?statuses, total = addresses.len(), "Live tokens found");
        Ok(addresses)
    }
}
