//! The Control Surface, spec.md §4.6: every operation the CLI/UI can call,
//! each returning a structured [`Outcome`] rather than throwing across the
//! boundary. `dispatch` is the JSON entrypoint the `control::ipc` transport
//! uses, grounded on the teacher's `rpc/dispatcher` method-name match.

pub mod errors;
pub mod ipc;
pub mod stats;

pub use errors::ControlError;
pub use stats::Stats;

use chain_adapter::ChainAdapter;
use coinjoin_engine::{AssembledTransaction, CoinJoinEngine, RevealPayload, RevealedParticipant};
use kaspa_privacy_common::amount::Sompi;
use kaspa_privacy_common::error::Outcome;
use kaspa_privacy_common::model::{CoinJoinSession, Destination, MixingSession};
use mixer_engine::MixerEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utxo_service::UtxoService;

/// `export_keys` response, spec.md §4.6 — the only operation that returns
/// private key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedKeys {
    pub deposit_address: String,
    pub deposit_private_key: String,
    pub intermediate_address: String,
    pub intermediate_private_key: String,
}

pub struct Controller<C: ChainAdapter> {
    mixer: Arc<MixerEngine<C>>,
    coinjoin: Arc<CoinJoinEngine<C>>,
    utxos: Arc<UtxoService<C>>,
    participant_count: usize,
}

impl<C: ChainAdapter> Controller<C> {
    pub fn new(
        mixer: Arc<MixerEngine<C>>,
        coinjoin: Arc<CoinJoinEngine<C>>,
        utxos: Arc<UtxoService<C>>,
        participant_count: usize,
    ) -> Self {
        Controller { mixer, coinjoin, utxos, participant_count }
    }

    pub async fn create_mixing(&self, destinations: Vec<Destination>, total_amount: Sompi) -> Outcome<MixingSession> {
        Outcome::from_result(self.mixer.create_session(destinations, total_amount).await.map_err(ControlError::from))
    }

    pub async fn list_sessions(&self) -> Outcome<Vec<MixingSession>> {
        Outcome::from_result(
            self.mixer
                .list_sessions()
                .await
                .map(|sessions| sessions.into_iter().map(MixingSession::redacted).collect())
                .map_err(ControlError::from),
        )
    }

    pub async fn get_session(&self, id: &str) -> Outcome<MixingSession> {
        Outcome::from_result(self.mixer.get_session(id).await.map(MixingSession::redacted).map_err(ControlError::from))
    }

    pub async fn delete_session(&self, id: &str) -> Outcome<()> {
        Outcome::from_result(self.mixer.delete_session(id).await.map_err(ControlError::from))
    }

    /// The only operation that returns secrets (spec.md §4.6): callers must
    /// authenticate at whatever layer sits in front of the Control Surface —
    /// this crate enforces nothing about the caller's identity itself.
    pub async fn export_keys(&self, id: &str) -> Outcome<ExportedKeys> {
        Outcome::from_result(self.mixer.get_session(id).await.map_err(ControlError::from).map(|s| ExportedKeys {
            deposit_address: s.deposit_address,
            deposit_private_key: s.deposit_private_key,
            intermediate_address: s.intermediate_address,
            intermediate_private_key: s.intermediate_private_key,
        }))
    }

    /// Runs the §4.3 creation sub-procedure (exclude set from the store, then
    /// the UTXO Service's `obtain`) before committing the session, spec.md §2
    /// "Control → CoinJoin creates commitment → UTXO Service ensures
    /// exact-amount UTXO".
    pub async fn create_coinjoin(
        &self,
        amount: Sompi,
        destination: String,
        source_address: String,
        source_private_key_hex: String,
        force_fresh: bool,
    ) -> Outcome<CoinJoinSession> {
        Outcome::from_result(
            self.coinjoin
                .create_coinjoin(&source_address, &source_private_key_hex, destination, amount, force_fresh)
                .await
                .map_err(ControlError::from),
        )
    }

    pub async fn reveal(&self, session_id: &str) -> Outcome<RevealPayload> {
        Outcome::from_result(self.coinjoin.reveal(session_id).await.map_err(ControlError::from))
    }

    /// Assembles a round from exactly `participant_count` already-revealed
    /// sessions (spec.md §4.4.2/§4.6 `build(session_ids[10])`).
    pub async fn build(&self, session_ids: Vec<String>) -> Outcome<AssembledTransaction> {
        Outcome::from_result(self.build_inner(session_ids).await)
    }

    async fn build_inner(&self, session_ids: Vec<String>) -> Result<AssembledTransaction, ControlError> {
        if session_ids.len() != self.participant_count {
            return Err(ControlError::WrongRoundSize { expected: self.participant_count, actual: session_ids.len() });
        }
        let mut revealed = Vec::with_capacity(session_ids.len());
        for id in &session_ids {
            let session = self.coinjoin.get_session(id).await.map_err(ControlError::from)?;
            let destination_address = session.destination_address.clone().ok_or_else(|| {
                ControlError::CoinJoin(coinjoin_engine::CoinJoinError::WrongState(id.clone()))
            })?;
            let utxos = session.revealed_utxos.clone().ok_or_else(|| {
                ControlError::CoinJoin(coinjoin_engine::CoinJoinError::WrongState(id.clone()))
            })?;
            revealed.push(RevealedParticipant { session_id: id.clone(), destination_address, utxos });
        }
        Ok(self.coinjoin.build(revealed).await?)
    }

    pub async fn sign(
        &self,
        session_id: &str,
        tx: kaspa_privacy_common::tx::Transaction,
        owning_session_by_input: Vec<String>,
        private_key_hex: &str,
        expected_unsigned_id: &str,
    ) -> Outcome<Vec<(usize, String)>> {
        Outcome::from_result(
            self.coinjoin
                .sign(session_id, &tx, &owning_session_by_input, private_key_hex, expected_unsigned_id)
                .await
                .map_err(ControlError::from),
        )
    }

    pub async fn submit(
        &self,
        tx: kaspa_privacy_common::tx::Transaction,
        owning_session_by_input: Vec<String>,
        signature_shares: HashMap<usize, String>,
    ) -> Outcome<String> {
        Outcome::from_result(self.coinjoin.submit(tx, &owning_session_by_input, &signature_shares).await.map_err(ControlError::from))
    }

    pub async fn stats(&self) -> Outcome<Stats> {
        Outcome::from_result(self.stats_inner().await)
    }

    async fn stats_inner(&self) -> Result<Stats, ControlError> {
        let mixing = self.mixer.list_sessions().await.map_err(ControlError::from)?;
        let coinjoin = self.coinjoin.list_sessions().await.map_err(ControlError::from)?;
        Ok(Stats::from_sessions(&mixing, &coinjoin))
    }

    /// Exposed so the daemon can release a UTXO lock once the owning session
    /// has moved to `failed` (spec.md §4.3).
    pub fn release_utxo(&self, outpoint: &kaspa_privacy_common::model::Outpoint) {
        self.utxos.release(outpoint);
    }
}
