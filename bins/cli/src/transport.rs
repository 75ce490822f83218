//! One line of JSON out, one line of JSON back, over the daemon's control
//! socket. Adapted from the teacher's `adex_cli::transport::SlurpTransport`
//! (`send<ReqT, OkT, ErrT>` over HTTP) with the wire swapped for the Unix
//! socket the Control IPC listens on; the request/response shape matches
//! `control::ipc`'s `{method, params}` / `{ok, ...}` envelopes.

use kaspa_privacy_common::error::ErrorKind;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Debug)]
pub enum TransportError {
    Connect(std::io::Error),
    Io(std::io::Error),
    Protocol(String),
    Remote { kind: ErrorKind, message: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(e) => write!(f, "could not reach the daemon: {e}"),
            TransportError::Io(e) => write!(f, "control socket i/o error: {e}"),
            TransportError::Protocol(s) => write!(f, "malformed response from daemon: {s}"),
            TransportError::Remote { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

/// Sends one `{method, params}` request and decodes the `{ok, ...}` reply,
/// returning `value` on success or the classified remote error otherwise.
pub async fn call<P: Serialize, T: DeserializeOwned>(socket_path: &str, method: &str, params: P) -> Result<T, TransportError> {
    let stream = UnixStream::connect(socket_path).await.map_err(TransportError::Connect)?;
    let (reader, mut writer) = stream.into_split();
    let request = json!({ "method": method, "params": params });
    let mut line = serde_json::to_string(&request).map_err(|e| TransportError::Protocol(e.to_string()))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await.map_err(TransportError::Io)?;

    let mut reply = String::new();
    BufReader::new(reader).read_line(&mut reply).await.map_err(TransportError::Io)?;
    if reply.is_empty() {
        return Err(TransportError::Protocol("daemon closed the connection without replying".to_string()));
    }

    let envelope: Value = serde_json::from_str(reply.trim()).map_err(|e| TransportError::Protocol(e.to_string()))?;
    let ok = envelope.get("ok").and_then(Value::as_bool).ok_or_else(|| TransportError::Protocol("missing `ok`".to_string()))?;
    if ok {
        let value = envelope.get("value").cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| TransportError::Protocol(e.to_string()))
    } else {
        let kind = envelope
            .get("kind")
            .and_then(Value::as_str)
            .map(classify_kind)
            .unwrap_or(ErrorKind::InternalInvariant);
        let message = envelope.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string();
        Err(TransportError::Remote { kind, message })
    }
}

fn classify_kind(s: &str) -> ErrorKind {
    match s {
        "input_validation" => ErrorKind::InputValidation,
        "utxo_not_available" => ErrorKind::UtxoNotAvailable,
        "utxo_creation_failed" => ErrorKind::UtxoCreationFailed,
        "node_unreachable" => ErrorKind::NodeUnreachable,
        "node_timeout" => ErrorKind::NodeTimeout,
        "sequence_lock" => ErrorKind::SequenceLock,
        "mempool_reject" => ErrorKind::MempoolReject,
        "commitment_mismatch" => ErrorKind::CommitmentMismatch,
        "unequal_contribution" => ErrorKind::UnequalContribution,
        "signature_rejected" => ErrorKind::SignatureRejected,
        "round_timeout" => ErrorKind::RoundTimeout,
        _ => ErrorKind::InternalInvariant,
    }
}

/// Exit codes per the CLI surface: 0 success, 1 user error, 2 node/bridge
/// unreachable, 3 state-machine rejection.
pub fn exit_code(error: &TransportError) -> i32 {
    match error {
        TransportError::Connect(_) => 2,
        TransportError::Io(_) => 2,
        TransportError::Protocol(_) => 1,
        TransportError::Remote { kind, .. } => match kind {
            ErrorKind::InputValidation | ErrorKind::UtxoNotAvailable => 1,
            ErrorKind::NodeUnreachable | ErrorKind::NodeTimeout => 2,
            ErrorKind::UtxoCreationFailed
            | ErrorKind::SequenceLock
            | ErrorKind::MempoolReject
            | ErrorKind::CommitmentMismatch
            | ErrorKind::UnequalContribution
            | ErrorKind::SignatureRejected
            | ErrorKind::RoundTimeout => 3,
            ErrorKind::InternalInvariant => 1,
        },
    }
}
