/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("No ledger for entity: {0}")]
    NotFound(String),

    #[error("Invalid natural key: {0}")]
    InvalidKey(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
