use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to (de)serialize session document: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("session pool is poisoned")]
    PoolPoisoned,
}

impl ClassifiedError for DbError {
    fn kind(&self) -> ErrorKind { ErrorKind::InternalInvariant }
}
