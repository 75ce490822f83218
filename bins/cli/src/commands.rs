//! One function per subcommand: build the `{method, params}` call, print the
//! result, translate any error into an exit code. Intentionally decoupled
//! from the domain crates — like the daemon, this binary only speaks the
//! Control IPC's JSON wire, never touching persistence or the chain adapter.

use crate::transport::{self, TransportError};
use serde_json::{json, Value};

async fn run(socket: &str, method: &str, params: Value) -> i32 {
    match transport::call::<Value, Value>(socket, method, params).await {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(s) => println!("{s}"),
                Err(_) => println!("{value}"),
            }
            0
        },
        Err(e) => report(&e),
    }
}

fn report(error: &TransportError) -> i32 {
    eprintln!("error: {error}");
    transport::exit_code(error)
}

fn parse_json_arg(name: &str, raw: &str) -> Result<Value, i32> {
    serde_json::from_str(raw).map_err(|e| {
        eprintln!("error: --{name} is not valid JSON: {e}");
        1
    })
}

pub async fn create(socket: &str, destinations_json: &str, total_amount: u64) -> i32 {
    let destinations = match parse_json_arg("destinations", destinations_json) {
        Ok(v) => v,
        Err(code) => return code,
    };
    run(socket, "create_mixing", json!({ "destinations": destinations, "total_amount": total_amount })).await
}

pub async fn list(socket: &str) -> i32 { run(socket, "list_sessions", Value::Null).await }

pub async fn status(socket: &str, id: &str) -> i32 { run(socket, "get_session", json!({ "id": id })).await }

pub async fn delete(socket: &str, id: &str) -> i32 { run(socket, "delete_session", json!({ "id": id })).await }

pub async fn export_keys(socket: &str, id: &str) -> i32 { run(socket, "export_keys", json!({ "id": id })).await }

#[allow(clippy::too_many_arguments)]
pub async fn coinjoin_create(
    socket: &str,
    amount: u64,
    destination: &str,
    source_address: &str,
    source_private_key_hex: &str,
    force_fresh: bool,
) -> i32 {
    run(
        socket,
        "create_coinjoin",
        json!({
            "amount": amount,
            "destination": destination,
            "source_address": source_address,
            "source_private_key_hex": source_private_key_hex,
            "force_fresh": force_fresh,
        }),
    )
    .await
}

pub async fn coinjoin_reveal(socket: &str, id: &str) -> i32 { run(socket, "reveal", json!({ "id": id })).await }

pub async fn coinjoin_build(socket: &str, session_ids: Vec<String>) -> i32 {
    run(socket, "build", json!({ "session_ids": session_ids })).await
}

#[allow(clippy::too_many_arguments)]
pub async fn coinjoin_sign(
    socket: &str,
    session_id: &str,
    tx_json: &str,
    owning_session_by_input_json: &str,
    private_key_hex: &str,
    expected_unsigned_id: &str,
) -> i32 {
    let tx = match parse_json_arg("tx", tx_json) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let owning_session_by_input = match parse_json_arg("owning-session-by-input", owning_session_by_input_json) {
        Ok(v) => v,
        Err(code) => return code,
    };
    run(
        socket,
        "sign",
        json!({
            "session_id": session_id,
            "tx": tx,
            "owning_session_by_input": owning_session_by_input,
            "private_key_hex": private_key_hex,
            "expected_unsigned_id": expected_unsigned_id,
        }),
    )
    .await
}

pub async fn coinjoin_submit(socket: &str, tx_json: &str, owning_session_by_input_json: &str, signature_shares_json: &str) -> i32 {
    let tx = match parse_json_arg("tx", tx_json) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let owning_session_by_input = match parse_json_arg("owning-session-by-input", owning_session_by_input_json) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let signature_shares = match parse_json_arg("signature-shares", signature_shares_json) {
        Ok(v) => v,
        Err(code) => return code,
    };
    run(
        socket,
        "submit",
        json!({ "tx": tx, "owning_session_by_input": owning_session_by_input, "signature_shares": signature_shares }),
    )
    .await
}

pub async fn stats(socket: &str) -> i32 { run(socket, "stats", Value::Null).await }
