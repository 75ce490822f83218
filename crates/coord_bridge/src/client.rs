//! The participant side of the relay. `BridgeServer` only ever sees what
//! participants choose to publish; this is the code that actually publishes
//! it — connecting to the relay, sending this process's own `JOIN`/`REVEAL`/
//! `SIG_SHARE`, folding every other participant's relayed messages back into
//! `coinjoin_engine::CoinJoinEngine::build`/`sign`/`submit`, so a round can
//! complete across independent processes rather than only inside one
//! process's in-memory test harness. Socket handling mirrors
//! `chain_adapter::kaspa_ws`'s split-sink/reader-task shape.

use crate::errors::BridgeError;
use crate::message::BridgeMessage;
use chain_adapter::ChainAdapter;
use coinjoin_engine::{CoinJoinEngine, RevealedParticipant};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

enum Incoming {
    RoundFormed { round_id: String },
    Message(BridgeMessage),
}

fn parse_incoming(text: &str) -> Option<Incoming> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type").and_then(|t| t.as_str()) == Some("ROUND_FORMED") {
        let round_id = value.get("round_id")?.as_str()?.to_string();
        return Some(Incoming::RoundFormed { round_id });
    }
    serde_json::from_value(value).ok().map(Incoming::Message)
}

/// Drives one already-committed session through `REVEAL` → `BUILD` → `SIGN`
/// → `SUBMIT` across `bridge_url`, spec.md §4.5. Returns the submitted
/// transaction id once the round the Bridge formed completes; an `ABORT`
/// relayed mid-round (including the idle-timeout sweep) marks the local
/// session `failed` and surfaces as [`BridgeError::RoundTimeout`].
pub async fn run_round<C: ChainAdapter + Send + Sync + 'static>(
    engine: Arc<CoinJoinEngine<C>>,
    bridge_url: &str,
    session_id: &str,
    private_key_hex: &str,
    participant_count: usize,
) -> Result<String, BridgeError> {
    let reveal = engine
        .reveal(session_id)
        .await
        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;
    let session = engine
        .get_session(session_id)
        .await
        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;

    let (ws, _) =
        tokio_tungstenite::connect_async(bridge_url).await.map_err(|e| BridgeError::Transport(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();
    let (incoming_tx, mut incoming_rx) = mpsc::unbounded_channel::<Incoming>();
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(t)) => t,
                Ok(Message::Close(_)) | Err(_) => break,
                _ => continue,
            };
            if let Some(incoming) = parse_incoming(&text) {
                if incoming_tx.send(incoming).is_err() {
                    break;
                }
            }
        }
    });

    send(&mut sink, &BridgeMessage::Join {
        amount: session.per_participant_amount,
        commitment: session.commitment.clone(),
        destination_hash: session.destination_hash.clone(),
        session_id: session_id.to_string(),
    })
    .await?;

    let round_id = loop {
        match incoming_rx.recv().await {
            Some(Incoming::RoundFormed { round_id }) => break round_id,
            Some(Incoming::Message(_)) => continue,
            None => return Err(BridgeError::Transport("bridge connection closed before round formed".to_string())),
        }
    };

    send(&mut sink, &BridgeMessage::Reveal {
        round_id: round_id.clone(),
        session_id: session_id.to_string(),
        destination_address: reveal.destination_address.clone(),
        salt: reveal.salt.clone(),
        utxos: reveal.utxos.clone(),
    })
    .await?;

    let mut revealed: HashMap<String, RevealedParticipant> = HashMap::new();
    revealed.insert(
        session_id.to_string(),
        RevealedParticipant {
            session_id: session_id.to_string(),
            destination_address: reveal.destination_address,
            utxos: reveal.utxos,
        },
    );
    while revealed.len() < participant_count {
        match next_message(&mut incoming_rx).await? {
            BridgeMessage::Reveal { session_id: sid, destination_address, utxos, .. } => {
                revealed.insert(sid.clone(), RevealedParticipant { session_id: sid, destination_address, utxos });
            },
            BridgeMessage::Abort { reason, .. } => return abort(&engine, session_id, reason).await,
            _ => continue,
        }
    }

    let assembled = engine
        .build(revealed.into_values().collect())
        .await
        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;
    let expected_unsigned_id = assembled.tx.unsigned_id();

    let shares = engine
        .sign(session_id, &assembled.tx, &assembled.owning_session_by_input, private_key_hex, &expected_unsigned_id)
        .await
        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;
    let (own_indices, own_signatures): (Vec<usize>, Vec<String>) = shares.into_iter().unzip();
    send(&mut sink, &BridgeMessage::SigShare {
        round_id: round_id.clone(),
        owning_session: session_id.to_string(),
        input_indices: own_indices.clone(),
        signatures: own_signatures.clone(),
    })
    .await?;

    // Exactly one participant actually broadcasts the signed transaction —
    // every other process's Chain Adapter connection would otherwise hit the
    // node's own "already known" rejection for the same transaction. The
    // lowest session id among the round's inputs is a deterministic choice
    // every participant derives identically from the same public `assembled`
    // value, no extra coordination message required.
    let submitter = assembled.owning_session_by_input.iter().min().cloned().unwrap_or_default();

    if session_id != submitter.as_str() {
        loop {
            match next_message(&mut incoming_rx).await? {
                BridgeMessage::Submitted { tx_id, .. } => {
                    engine
                        .complete_session(session_id, tx_id.clone())
                        .await
                        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;
                    return Ok(tx_id);
                },
                BridgeMessage::Abort { reason, .. } => return abort(&engine, session_id, reason).await,
                _ => continue,
            }
        }
    }

    let mut signature_shares: HashMap<usize, String> = own_indices.into_iter().zip(own_signatures).collect();
    let total_inputs = assembled.tx.inputs.len();
    while signature_shares.len() < total_inputs {
        match next_message(&mut incoming_rx).await? {
            BridgeMessage::SigShare { input_indices, signatures, .. } => {
                for (index, signature) in input_indices.into_iter().zip(signatures) {
                    signature_shares.entry(index).or_insert(signature);
                }
            },
            BridgeMessage::Abort { reason, .. } => return abort(&engine, session_id, reason).await,
            _ => continue,
        }
    }

    let tx_id = engine
        .submit(assembled.tx, &assembled.owning_session_by_input, &signature_shares)
        .await
        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;
    let _ = send(&mut sink, &BridgeMessage::Submitted { round_id, tx_id: tx_id.clone() }).await;
    Ok(tx_id)
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<Incoming>) -> Result<BridgeMessage, BridgeError> {
    loop {
        match rx.recv().await {
            Some(Incoming::Message(message)) => return Ok(message),
            Some(Incoming::RoundFormed { .. }) => continue,
            None => return Err(BridgeError::Transport("bridge connection closed mid-round".to_string())),
        }
    }
}

async fn abort<C: ChainAdapter>(
    engine: &CoinJoinEngine<C>,
    session_id: &str,
    reason: String,
) -> Result<String, BridgeError> {
    engine
        .fail_session(session_id, reason.clone())
        .await
        .map_err(|e| BridgeError::RevealRejected { session_id: session_id.to_string(), source: e })?;
    Err(BridgeError::RoundTimeout(reason))
}

type Sink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

async fn send(sink: &mut Sink, message: &BridgeMessage) -> Result<(), BridgeError> {
    let payload = serde_json::to_string(message).map_err(|e| BridgeError::Malformed(e.to_string()))?;
    sink.send(Message::Text(payload)).await.map_err(|e| BridgeError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::BridgeServer;
    use chain_adapter::mock::MockChainAdapter;
    use kaspa_privacy_common::amount::Sompi;
    use kaspa_privacy_common::clock::TestClock;
    use kaspa_privacy_common::config::{BridgeConfig, SessionConfig};
    use kaspa_privacy_common::crypto;
    use privacy_db::sqlite::SqliteSessionStore;
    use tokio::net::TcpListener;
    use utxo_service::UtxoService;

    /// One participant's own process: its own session store, its own engine,
    /// but the same `MockChainAdapter` every participant's real node
    /// connection would ultimately agree on.
    fn own_process(chain: Arc<MockChainAdapter>) -> Arc<CoinJoinEngine<MockChainAdapter>> {
        let db: Arc<dyn privacy_db::SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let clock = Arc::new(TestClock::new(1_000_000));
        let utxos = Arc::new(UtxoService::new(chain.clone()));
        let config = SessionConfig { participant_count: 2, ..SessionConfig::default() };
        Arc::new(CoinJoinEngine::new(chain, db, clock, config, utxos))
    }

    #[tokio::test]
    async fn two_independent_processes_complete_a_round_through_the_bridge() {
        let chain = Arc::new(MockChainAdapter::new());
        let engine_a = own_process(chain.clone());
        let engine_b = own_process(chain.clone());

        let kp_a = crypto::generate_keypair();
        chain.deposit(&kp_a.address, 100_000_000);
        let session_a = engine_a
            .create_coinjoin(&kp_a.address, &kp_a.private_key_hex, "kaspa:dest-a".to_string(), Sompi(100_000_000), false)
            .await
            .unwrap();

        let kp_b = crypto::generate_keypair();
        chain.deposit(&kp_b.address, 100_000_000);
        let session_b = engine_b
            .create_coinjoin(&kp_b.address, &kp_b.private_key_hex, "kaspa:dest-b".to_string(), Sompi(100_000_000), false)
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = BridgeServer::new(2, Arc::new(TestClock::new(0)), BridgeConfig::default());
        let server_clone = server.clone();
        tokio::spawn(async move { server_clone.serve(listener).await });
        let url = format!("ws://{addr}");

        let sign_key_a = crypto::generate_keypair().private_key_hex;
        let sign_key_b = crypto::generate_keypair().private_key_hex;

        let (result_a, result_b) = tokio::join!(
            run_round(engine_a.clone(), &url, &session_a.id, &sign_key_a, 2),
            run_round(engine_b.clone(), &url, &session_b.id, &sign_key_b, 2),
        );
        let tx_id_a = result_a.unwrap();
        let tx_id_b = result_b.unwrap();
        assert_eq!(tx_id_a, tx_id_b);
        assert_eq!(chain.submitted_transactions().len(), 1, "only the designated submitter hits the chain");

        let final_a = engine_a.get_session(&session_a.id).await.unwrap();
        let final_b = engine_b.get_session(&session_b.id).await.unwrap();
        assert_eq!(final_a.status, kaspa_privacy_common::model::CoinJoinStatus::Completed);
        assert_eq!(final_b.status, kaspa_privacy_common::model::CoinJoinStatus::Completed);
        assert_eq!(final_a.payout_tx_id.as_deref(), Some(tx_id_a.as_str()));
        assert_eq!(final_b.payout_tx_id.as_deref(), Some(tx_id_a.as_str()));
    }
}
