use coinjoin_engine::CoinJoinError;
use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use mixer_engine::MixerError;
use thiserror::Error;
use utxo_service::UtxoServiceError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Mixer(#[from] MixerError),
    #[error(transparent)]
    CoinJoin(#[from] CoinJoinError),
    #[error(transparent)]
    Utxo(#[from] UtxoServiceError),
    #[error("build requires exactly {expected} revealed sessions, got {actual}")]
    WrongRoundSize { expected: usize, actual: usize },
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl ClassifiedError for ControlError {
    fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Mixer(e) => e.kind(),
            ControlError::CoinJoin(e) => e.kind(),
            ControlError::Utxo(e) => e.kind(),
            ControlError::WrongRoundSize { .. } => ErrorKind::InputValidation,
            ControlError::UnknownMethod(_) => ErrorKind::InputValidation,
            ControlError::MalformedRequest(_) => ErrorKind::InputValidation,
        }
    }
}
