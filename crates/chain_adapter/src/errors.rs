use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use thiserror::Error;

/// Chain Adapter failure modes, spec.md §4.1.
#[derive(Debug, Error, Clone)]
pub enum ChainAdapterError {
    #[error("insufficient balance at address")]
    InsufficientBalance,
    #[error("transaction rejected by mempool: {0}")]
    MempoolReject(String),
    #[error("sequence lock: node requires more elapsed blocks before acceptance")]
    SequenceLock,
    #[error("node unreachable: {0}")]
    NodeUnreachable(String),
    #[error("node request timed out")]
    NodeTimeout,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("wait for output timed out")]
    TimedOut,
    #[error("malformed response from node: {0}")]
    MalformedResponse(String),
}

impl ClassifiedError for ChainAdapterError {
    fn kind(&self) -> ErrorKind {
        match self {
            ChainAdapterError::InsufficientBalance => ErrorKind::UtxoCreationFailed,
            ChainAdapterError::MempoolReject(_) => ErrorKind::MempoolReject,
            ChainAdapterError::SequenceLock => ErrorKind::SequenceLock,
            ChainAdapterError::NodeUnreachable(_) => ErrorKind::NodeUnreachable,
            ChainAdapterError::NodeTimeout | ChainAdapterError::TimedOut => ErrorKind::NodeTimeout,
            ChainAdapterError::InvalidSignature => ErrorKind::SignatureRejected,
            ChainAdapterError::MalformedResponse(_) => ErrorKind::InternalInvariant,
        }
    }
}
