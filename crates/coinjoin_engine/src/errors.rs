use chain_adapter::ChainAdapterError;
use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoinJoinError {
    #[error("unknown coinjoin session {0}")]
    NotFound(String),
    #[error("session {0} is not in the expected state for this operation")]
    WrongState(String),
    #[error("reveal does not hash to the published commitment")]
    CommitmentMismatch,
    #[error("revealed outpoint {0} is already in use by another concurrently revealing session")]
    DuplicateReveal(String),
    #[error("exactly {expected} reveals are required to assemble, got {actual}")]
    IncompleteRound { expected: usize, actual: usize },
    #[error("per-session input contributions are not exactly equal")]
    UnequalContribution,
    #[error("invalid contribution: {0}")]
    InvalidContribution(String),
    #[error("assembled transaction mass {mass} exceeds the limit {limit}")]
    MassExceeded { mass: u64, limit: u64 },
    #[error("signer refused: {0}")]
    SignatureRejected(String),
    #[error("not every input index has an accepted signature")]
    MissingSignatures,
    #[error("utxo {0} is already bound to another non-failed coinjoin session")]
    OutpointInUse(String),
    #[error(transparent)]
    ChainAdapter(#[from] ChainAdapterError),
    #[error("db error: {0}")]
    Db(#[from] privacy_db::DbError),
    #[error(transparent)]
    Utxo(#[from] utxo_service::UtxoServiceError),
}

impl ClassifiedError for CoinJoinError {
    fn kind(&self) -> ErrorKind {
        match self {
            CoinJoinError::NotFound(_) | CoinJoinError::WrongState(_) => ErrorKind::InputValidation,
            CoinJoinError::CommitmentMismatch => ErrorKind::CommitmentMismatch,
            CoinJoinError::DuplicateReveal(_) => ErrorKind::CommitmentMismatch,
            CoinJoinError::IncompleteRound { .. } => ErrorKind::RoundTimeout,
            CoinJoinError::UnequalContribution | CoinJoinError::InvalidContribution(_) => ErrorKind::UnequalContribution,
            CoinJoinError::MassExceeded { .. } => ErrorKind::InternalInvariant,
            CoinJoinError::SignatureRejected(_) | CoinJoinError::MissingSignatures => ErrorKind::SignatureRejected,
            CoinJoinError::OutpointInUse(_) => ErrorKind::UtxoNotAvailable,
            CoinJoinError::ChainAdapter(e) => e.kind(),
            CoinJoinError::Db(_) => ErrorKind::InternalInvariant,
            CoinJoinError::Utxo(e) => e.kind(),
        }
    }
}
