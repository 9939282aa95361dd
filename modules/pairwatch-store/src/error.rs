/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Table {0} not found or has no columns")]
    MissingTable(String),

    #[error("Column '{column}' contains an invalid numeric value for address {address}")]
    InvalidNumeric { column: String, address: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
