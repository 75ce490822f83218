use chain_adapter::ChainAdapterError;
use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("unknown mixing session {0}")]
    NotFound(String),
    #[error("session {0} is not in the expected state for this operation")]
    WrongState(String),
    #[error(transparent)]
    ChainAdapter(#[from] ChainAdapterError),
    #[error("db error: {0}")]
    Db(#[from] privacy_db::DbError),
    #[error("signing failed: {0}")]
    Signing(String),
}

impl ClassifiedError for MixerError {
    fn kind(&self) -> ErrorKind {
        match self {
            MixerError::NotFound(_) | MixerError::WrongState(_) => ErrorKind::InputValidation,
            MixerError::ChainAdapter(e) => e.kind(),
            MixerError::Db(_) => ErrorKind::InternalInvariant,
            MixerError::Signing(_) => ErrorKind::InternalInvariant,
        }
    }
}
