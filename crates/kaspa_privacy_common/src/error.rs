//! Shared error taxonomy. Every fallible crate in the workspace defines its
//! own `thiserror::Error` enum for the operations it owns, and implements
//! [`ClassifiedError`] so the Control Surface can map any error back to one
//! of the kinds below without the caller needing to know which crate raised
//! it — mirrors the teacher's per-error `HttpStatusCode` classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The error kinds from spec.md §7, as a closed set shared across crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    UtxoNotAvailable,
    UtxoCreationFailed,
    NodeUnreachable,
    NodeTimeout,
    SequenceLock,
    MempoolReject,
    CommitmentMismatch,
    UnequalContribution,
    SignatureRejected,
    RoundTimeout,
    InternalInvariant,
}

impl ErrorKind {
    /// Whether the Scheduler should retry an operation that failed with this
    /// kind, per spec.md §4.1/§5 (`NodeUnreachable`, `NodeTimeout`, and
    /// `SequenceLock` are retry-worthy; everything else is surfaced at once).
    pub fn is_retry_worthy(self) -> bool {
        matches!(self, ErrorKind::NodeUnreachable | ErrorKind::NodeTimeout | ErrorKind::SequenceLock)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::UtxoNotAvailable => "utxo_not_available",
            ErrorKind::UtxoCreationFailed => "utxo_creation_failed",
            ErrorKind::NodeUnreachable => "node_unreachable",
            ErrorKind::NodeTimeout => "node_timeout",
            ErrorKind::SequenceLock => "sequence_lock",
            ErrorKind::MempoolReject => "mempool_reject",
            ErrorKind::CommitmentMismatch => "commitment_mismatch",
            ErrorKind::UnequalContribution => "unequal_contribution",
            ErrorKind::SignatureRejected => "signature_rejected",
            ErrorKind::RoundTimeout => "round_timeout",
            ErrorKind::InternalInvariant => "internal_invariant",
        };
        f.write_str(s)
    }
}

/// Implemented by every crate-local error enum so callers at any layer can
/// recover the shared [`ErrorKind`] without matching on foreign variants.
pub trait ClassifiedError {
    fn kind(&self) -> ErrorKind;
}

/// The `{ok, kind, message}` envelope every Control Surface operation
/// returns, per spec.md §4.6/§7. Serializes as either `{"ok":true,"value":..}`
/// or `{"ok":false,"kind":..,"message":..}` — never a bare Rust `Result` that
/// would throw across the IPC boundary.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Ok(T),
    Err { kind: ErrorKind, message: String },
}

impl<T> Outcome<T> {
    pub fn from_result<E: ClassifiedError + fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Err {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool { matches!(self, Outcome::Ok(_)) }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            Outcome::Ok(value) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("value", value)?;
                map.end()
            },
            Outcome::Err { kind, message } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("kind", kind)?;
                map.serialize_entry("message", message)?;
                map.end()
            },
        }
    }
}
