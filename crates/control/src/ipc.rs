//! Newline-delimited JSON over a Unix domain socket, the CLI's transport to
//! the daemon (spec.md §6 "Control IPC... No interface beyond this layer
//! reads or writes persistence directly"). Adapted from the teacher's HTTP
//! JSON-RPC dispatcher (`rpc/dispatcher`), swapped from HTTP to UDS since
//! this tool has no network-facing control API.

use crate::{Controller, ControlError};
use chain_adapter::ChainAdapter;
use kaspa_privacy_common::error::{ErrorKind, Outcome};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    #[serde(default)]
    params: Value,
}

/// Accepts connections on `listener` until the process exits; each line of
/// input is one request, each line of output one `{ok, ...}` reply.
pub async fn serve<C: ChainAdapter + Send + Sync + 'static>(controller: Arc<Controller<C>>, listener: UnixListener) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("control ipc: accept failed: {e}");
                continue;
            },
        };
        let controller = controller.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(controller, stream).await {
                log::warn!("control ipc: connection ended: {e}");
            }
        });
    }
}

async fn handle_connection<C: ChainAdapter>(controller: Arc<Controller<C>>, stream: UnixStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&controller, request).await,
            Err(e) => err_json(ControlError::MalformedRequest(e.to_string())),
        };
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

/// Matches the method name the way the teacher's `dispatcher_v2` matches on
/// `request.method`, each arm deserializing its own parameter shape.
async fn dispatch<C: ChainAdapter>(controller: &Controller<C>, request: Request) -> String {
    match request.method.as_str() {
        "list_sessions" => to_json(controller.list_sessions().await),
        "get_session" => with_params::<IdParams, _, _, _>(&request.params, |p| controller.get_session(&p.id)).await,
        "delete_session" => with_params::<IdParams, _, _, _>(&request.params, |p| controller.delete_session(&p.id)).await,
        "export_keys" => with_params::<IdParams, _, _, _>(&request.params, |p| controller.export_keys(&p.id)).await,
        "create_mixing" => {
            with_params::<CreateMixingParams, _, _, _>(&request.params, |p| controller.create_mixing(p.destinations, p.total_amount))
                .await
        },
        "create_coinjoin" => {
            with_params::<CreateCoinJoinParams, _, _, _>(&request.params, |p| {
                controller.create_coinjoin(p.amount, p.destination, p.source_address, p.source_private_key_hex, p.force_fresh)
            })
            .await
        },
        "reveal" => with_params::<IdParams, _, _, _>(&request.params, |p| controller.reveal(&p.id)).await,
        "build" => with_params::<BuildParams, _, _, _>(&request.params, |p| controller.build(p.session_ids)).await,
        "sign" => {
            match parse::<SignParams>(&request.params) {
                Ok(p) => to_json(
                    controller
                        .sign(&p.session_id, p.tx, p.owning_session_by_input, &p.private_key_hex, &p.expected_unsigned_id)
                        .await,
                ),
                Err(e) => err_json(e),
            }
        },
        "submit" => {
            match parse::<SubmitParams>(&request.params) {
                Ok(p) => to_json(controller.submit(p.tx, p.owning_session_by_input, p.signature_shares).await),
                Err(e) => err_json(e),
            }
        },
        "stats" => to_json(controller.stats().await),
        other => err_json(ControlError::UnknownMethod(other.to_string())),
    }
}

/// Parses `params` into `P` and runs `f`, flattening the parse error and the
/// operation's own `Outcome` into the same `{ok, ...}` wire shape.
async fn with_params<P, T, F, Fut>(params: &Value, f: F) -> String
where
    P: serde::de::DeserializeOwned,
    T: serde::Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Outcome<T>>,
{
    match parse::<P>(params) {
        Ok(p) => to_json(f(p).await),
        Err(e) => err_json(e),
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, ControlError> {
    serde_json::from_value(params.clone()).map_err(|e| ControlError::MalformedRequest(e.to_string()))
}

fn to_json<T: serde::Serialize>(outcome: Outcome<T>) -> String {
    serde_json::to_string(&outcome)
        .unwrap_or_else(|e| format!("{{\"ok\":false,\"kind\":\"internal_invariant\",\"message\":\"{e}\"}}"))
}

fn err_json(e: ControlError) -> String {
    to_json(Outcome::<()>::Err { kind: ErrorKind::InputValidation, message: e.to_string() })
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateMixingParams {
    destinations: Vec<kaspa_privacy_common::model::Destination>,
    total_amount: kaspa_privacy_common::amount::Sompi,
}

#[derive(Debug, Deserialize)]
struct CreateCoinJoinParams {
    amount: kaspa_privacy_common::amount::Sompi,
    destination: String,
    source_address: String,
    source_private_key_hex: String,
    #[serde(default)]
    force_fresh: bool,
}

#[derive(Debug, Deserialize)]
struct BuildParams {
    session_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SignParams {
    session_id: String,
    tx: kaspa_privacy_common::tx::Transaction,
    owning_session_by_input: Vec<String>,
    private_key_hex: String,
    expected_unsigned_id: String,
}

#[derive(Debug, Deserialize)]
struct SubmitParams {
    tx: kaspa_privacy_common::tx::Transaction,
    owning_session_by_input: Vec<String>,
    signature_shares: HashMap<usize, String>,
}
