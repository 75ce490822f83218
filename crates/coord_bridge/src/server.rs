//! The actual per-round relay: accepts WebSocket connections, groups `JOIN`s
//! into rounds via [`RoundRegistry`], and fans `REVEAL`/`SIG_SHARE`/
//! `SUBMITTED`/`ABORT` out to the round's other participants. Connection
//! handling follows the split-sink/reader-task shape of
//! `chain_adapter::kaspa_ws`.

use crate::errors::BridgeError;
use crate::message::BridgeMessage;
use crate::round::RoundRegistry;
use futures::{SinkExt, StreamExt};
use kaspa_privacy_common::clock::Clock;
use kaspa_privacy_common::config::BridgeConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

type Outbound = mpsc::UnboundedSender<Message>;

/// Relays the round message set between participants. Holds no private key
/// material and never inspects anything past what each message carries.
pub struct BridgeServer {
    registry: Mutex<RoundRegistry>,
    clock: Arc<dyn Clock>,
    config: BridgeConfig,
    connections: Mutex<HashMap<String, Outbound>>,
}

impl BridgeServer {
    pub fn new(participant_count: usize, clock: Arc<dyn Clock>, config: BridgeConfig) -> Arc<Self> {
        Arc::new(BridgeServer {
            registry: Mutex::new(RoundRegistry::new(participant_count)),
            clock,
            config,
            connections: Mutex::new(HashMap::new()),
        })
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("bridge: accept failed: {e}");
                    continue;
                },
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    log::warn!("bridge: connection from {peer} ended: {e}");
                }
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> Result<(), BridgeError> {
        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| BridgeError::Transport(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let mut own_session_id: Option<String> = None;
        while let Some(frame) = stream.next().await {
            let frame = frame.map_err(|e| BridgeError::Transport(e.to_string()))?;
            let text = match frame {
                Message::Text(t) => t,
                Message::Close(_) => break,
                _ => continue,
            };
            let parsed: BridgeMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("bridge: malformed message: {e}");
                    continue;
                },
            };
            if let Err(e) = self.dispatch(parsed, &tx, &mut own_session_id).await {
                log::warn!("bridge: rejected message: {e}");
                let abort = serde_json::to_string(&BridgeMessage::Abort {
                    round_id: String::new(),
                    reason: e.to_string(),
                    offending_session: own_session_id.clone(),
                })
                .unwrap_or_default();
                let _ = tx.send(Message::Text(abort));
            }
        }

        drop(tx);
        let _ = writer.await;
        Ok(())
    }

    async fn dispatch(
        &self,
        message: BridgeMessage,
        outbound: &Outbound,
        own_session_id: &mut Option<String>,
    ) -> Result<(), BridgeError> {
        let now_ms = self.clock.now_ms();
        match &message {
            BridgeMessage::Join { session_id, amount, commitment, destination_hash } => {
                *own_session_id = Some(session_id.clone());
                self.connections.lock().await.insert(session_id.clone(), outbound.clone());
                let formed = {
                    let mut registry = self.registry.lock().await;
                    registry.join(*amount, session_id.clone(), commitment.clone(), destination_hash.clone(), now_ms)
                };
                if let Some(round_id) = formed {
                    self.announce_round(&round_id).await;
                }
                Ok(())
            },
            other => {
                let round_id = other.round_id().ok_or_else(|| BridgeError::Malformed("missing round_id".to_string()))?.to_string();
                {
                    let mut registry = self.registry.lock().await;
                    let round = registry.round_mut(&round_id).ok_or_else(|| BridgeError::UnknownRound(round_id.clone()))?;
                    round.accept(other, now_ms)?;
                }
                self.relay(&round_id, &message).await;
                Ok(())
            },
        }
    }

    /// Tells every member of a just-formed round its id, so they know to
    /// start publishing `REVEAL`. Not part of the participant message set;
    /// a transport-level event of the relay itself.
    async fn announce_round(&self, round_id: &str) {
        let session_ids: Vec<String> = {
            let registry = self.registry.lock().await;
            match registry.round(round_id) {
                Some(round) => round.commitments.keys().cloned().collect(),
                None => return,
            }
        };
        let payload = serde_json::json!({ "type": "ROUND_FORMED", "round_id": round_id }).to_string();
        self.send_to(&session_ids, &payload).await;
    }

    /// Fans a round message out to every other currently-connected
    /// participant of that round.
    async fn relay(&self, round_id: &str, message: &BridgeMessage) {
        let session_ids: Vec<String> = {
            let registry = self.registry.lock().await;
            match registry.round(round_id) {
                Some(round) => round.commitments.keys().cloned().collect(),
                None => return,
            }
        };
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("bridge: failed to serialize relay message: {e}");
                return;
            },
        };
        self.send_to(&session_ids, &payload).await;
    }

    async fn send_to(&self, session_ids: &[String], payload: &str) {
        let connections = self.connections.lock().await;
        for session_id in session_ids {
            if let Some(sender) = connections.get(session_id) {
                let _ = sender.send(Message::Text(payload.to_string()));
            }
        }
    }

    /// Aborts and drops rounds idle past the configured timeout, spec.md
    /// §4.5. Meant to be driven by the Scheduler crate's periodic tick.
    pub async fn sweep_idle_rounds(&self) {
        let idle_timeout_ms = self.config.round_idle_timeout.as_millis() as u64;
        let now_ms = self.clock.now_ms();
        let idle: Vec<String> = {
            let registry = self.registry.lock().await;
            registry.idle_round_ids(now_ms, idle_timeout_ms)
        };
        for round_id in idle {
            let session_ids: Vec<String> = {
                let mut registry = self.registry.lock().await;
                registry.remove(&round_id).map(|r| r.commitments.into_keys().collect()).unwrap_or_default()
            };
            let abort = serde_json::to_string(&BridgeMessage::Abort {
                round_id: round_id.clone(),
                reason: "round idle timeout".to_string(),
                offending_session: None,
            })
            .unwrap_or_default();
            self.send_to(&session_ids, &abort).await;
            log::warn!("bridge: round {round_id} timed out idle, {} sessions aborted", session_ids.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_privacy_common::amount::Sompi;
    use kaspa_privacy_common::clock::TestClock;

    async fn spawn_server(participant_count: usize) -> (Arc<BridgeServer>, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = BridgeServer::new(participant_count, Arc::new(TestClock::new(0)), BridgeConfig::default());
        let server_clone = server.clone();
        tokio::spawn(async move { server_clone.serve(listener).await });
        (server, addr)
    }

    fn real_commitment(destination_address: &str, salt: &str, amount: Sompi) -> String {
        let dest_hash = coinjoin_engine::commitment::destination_hash(destination_address, salt);
        let digest = coinjoin_engine::commitment::utxo_digest(&[]);
        coinjoin_engine::commitment::commitment(&dest_hash, &digest, amount)
    }

    #[tokio::test]
    async fn two_joins_form_a_round_and_relay_reveals() {
        let (_server, addr) = spawn_server(2).await;
        let url = format!("ws://{addr}");

        let (mut a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut b, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let commitment_a = real_commitment("kaspa:a", "s", Sompi(100_000_000));
        let destination_hash_a = coinjoin_engine::commitment::destination_hash("kaspa:a", "s");
        let join_a = serde_json::to_string(&BridgeMessage::Join {
            amount: Sompi(100_000_000),
            commitment: commitment_a,
            destination_hash: destination_hash_a,
            session_id: "a".to_string(),
        })
        .unwrap();
        let join_b = serde_json::to_string(&BridgeMessage::Join {
            amount: Sompi(100_000_000),
            commitment: "cb".to_string(),
            destination_hash: "db".to_string(),
            session_id: "b".to_string(),
        })
        .unwrap();

        a.send(Message::Text(join_a)).await.unwrap();
        b.send(Message::Text(join_b)).await.unwrap();

        let announce_a = a.next().await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(announce_a.to_text().unwrap()).unwrap();
        assert_eq!(parsed["type"], "ROUND_FORMED");
        let round_id = parsed["round_id"].as_str().unwrap().to_string();

        let reveal_a = serde_json::to_string(&BridgeMessage::Reveal {
            round_id: round_id.clone(),
            session_id: "a".to_string(),
            destination_address: "kaspa:a".to_string(),
            salt: "s".to_string(),
            utxos: vec![],
        })
        .unwrap();
        a.send(Message::Text(reveal_a)).await.unwrap();

        let relayed = b.next().await.unwrap().unwrap();
        let relayed: BridgeMessage = serde_json::from_str(relayed.to_text().unwrap()).unwrap();
        match relayed {
            BridgeMessage::Reveal { session_id, .. } => assert_eq!(session_id, "a"),
            other => panic!("expected a relayed REVEAL, got {other:?}"),
        }
    }
}
