use kaspa_privacy_common::error::{ClassifiedError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown round {0}")]
    UnknownRound(String),
    #[error("unknown session {0} for this round")]
    UnknownSession(String),
    #[error("message rejected for round {round_id}: {phase}")]
    OutOfOrder { round_id: String, phase: String },
    #[error("input index {input_index} already carries a signature from a different session")]
    ForeignSignature { input_index: usize },
    #[error("input index {input_index} already carries a conflicting signature")]
    DuplicateSignature { input_index: usize },
    #[error("session {session_id} failed reveal verification: {source}")]
    RevealRejected {
        session_id: String,
        #[source]
        source: coinjoin_engine::CoinJoinError,
    },
    #[error("round {0} timed out waiting for the next message")]
    RoundTimeout(String),
    #[error("malformed bridge message: {0}")]
    Malformed(String),
    #[error("websocket error: {0}")]
    Transport(String),
}

impl ClassifiedError for BridgeError {
    fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::UnknownRound(_) | BridgeError::UnknownSession(_) => ErrorKind::InputValidation,
            BridgeError::OutOfOrder { .. } => ErrorKind::InputValidation,
            BridgeError::ForeignSignature { .. } | BridgeError::DuplicateSignature { .. } => ErrorKind::SignatureRejected,
            BridgeError::RevealRejected { source, .. } => source.kind(),
            BridgeError::RoundTimeout(_) => ErrorKind::RoundTimeout,
            BridgeError::Malformed(_) => ErrorKind::InputValidation,
            BridgeError::Transport(_) => ErrorKind::NodeUnreachable,
        }
    }
}
