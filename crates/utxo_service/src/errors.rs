use chain_adapter::ChainAdapterError;
use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UtxoServiceError {
    #[error("no exact-match UTXO for the requested amount, and creation was not attempted")]
    NotAvailable,
    #[error("self-send to create a matching UTXO failed: {0}")]
    CreationFailed(String),
    #[error("timed out waiting for the matching UTXO to become visible")]
    WaitTimedOut,
    #[error(transparent)]
    ChainAdapter(#[from] ChainAdapterError),
    #[error("db error: {0}")]
    Db(#[from] privacy_db::DbError),
}

impl ClassifiedError for UtxoServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            UtxoServiceError::NotAvailable => ErrorKind::UtxoNotAvailable,
            UtxoServiceError::CreationFailed(_) | UtxoServiceError::WaitTimedOut => ErrorKind::UtxoCreationFailed,
            UtxoServiceError::ChainAdapter(e) => e.kind(),
            UtxoServiceError::Db(_) => ErrorKind::InternalInvariant,
        }
    }
}
