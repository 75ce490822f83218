//! Zero-trust CoinJoin rounds (spec.md §4.4): commitment, reveal, assembly,
//! per-input signing, submission. The networked relay between participants
//! (round formation, message fan-out, ordering enforcement) lives in
//! `coord_bridge`; this crate holds the math and the per-session state
//! machine every participant's own process runs locally.

pub mod assembler;
pub mod commitment;
pub mod errors;
pub mod signer;

pub use assembler::{assemble, AssembledTransaction, RevealedParticipant};
pub use errors::CoinJoinError;

use chain_adapter::ChainAdapter;
use kaspa_privacy_common::amount::Sompi;
use kaspa_privacy_common::clock::Clock;
use kaspa_privacy_common::config::SessionConfig;
use kaspa_privacy_common::model::{CoinJoinSession, CoinJoinStatus, UtxoEntry};
use kaspa_privacy_common::tx::Transaction;
use kaspa_privacy_common::{info, warn};
use privacy_db::SessionStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use utxo_service::UtxoService;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RevealPayload {
    pub session_id: String,
    pub destination_address: String,
    pub salt: String,
    pub utxos: Vec<UtxoEntry>,
}

pub struct CoinJoinEngine<C: ChainAdapter> {
    chain: Arc<C>,
    db: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    utxos: Arc<UtxoService<C>>,
    /// Idempotency bookkeeping from spec.md §4.4.9 "added": a second submit
    /// of an already-completed round's transaction must not re-invoke the
    /// Chain Adapter.
    submitted_tx_ids: Mutex<HashSet<String>>,
}

impl<C: ChainAdapter> CoinJoinEngine<C> {
    pub fn new(
        chain: Arc<C>,
        db: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        utxos: Arc<UtxoService<C>>,
    ) -> Self {
        CoinJoinEngine { chain, db, clock, config, utxos, submitted_tx_ids: Mutex::new(HashSet::new()) }
    }

    /// Runs the §4.3 creation sub-procedure before committing a fresh
    /// session, spec.md §4.4.1/§2 ("UTXO Service ensures exact-amount UTXO").
    /// Computes the exclude set from every existing CoinJoin session —
    /// including completed ones — so the same outpoint can never back two
    /// sessions at once (spec.md §3), then has the UTXO Service hand back or
    /// freshly create a UTXO at `source_address` worth exactly
    /// `per_participant_amount`.
    pub async fn create_coinjoin(
        &self,
        source_address: &str,
        source_private_key_hex: &str,
        destination_address: String,
        per_participant_amount: Sompi,
        force_fresh: bool,
    ) -> Result<CoinJoinSession, CoinJoinError> {
        let exclude_set = self.db.excluded_coinjoin_outpoints().await?;
        let obtained = self
            .utxos
            .obtain(source_address, source_private_key_hex, per_participant_amount, &exclude_set, force_fresh)
            .await?;
        let utxos = vec![obtained];

        let total: Sompi = utxos.iter().map(|u| u.amount).sum();
        if utxos.is_empty() || total != per_participant_amount {
            return Err(CoinJoinError::InvalidContribution(format!(
                "utxo set totals {total}, expected exactly {per_participant_amount}"
            )));
        }

        let salt = commitment::generate_salt();
        let dest_hash = commitment::destination_hash(&destination_address, &salt);
        let pairs: Vec<(kaspa_privacy_common::model::Outpoint, Sompi)> =
            utxos.iter().map(|u| (u.outpoint.clone(), u.amount)).collect();
        let digest = commitment::utxo_digest(&pairs);
        let commitment_value = commitment::commitment(&dest_hash, &digest, per_participant_amount);

        let now = self.clock.now_ms();
        let session = CoinJoinSession {
            id: Uuid::new_v4().to_string(),
            per_participant_amount,
            commitment: commitment_value,
            destination_hash: dest_hash,
            original_utxos: Some(utxos),
            original_destination: Some(destination_address),
            salt: Some(salt),
            status: CoinJoinStatus::Committed,
            revealed_utxos: None,
            destination_address: None,
            round_id: None,
            payout_tx_id: None,
            created_at: now,
            updated_at: now,
            error: None,
            schema_version: kaspa_privacy_common::model::SCHEMA_VERSION,
        };
        self.db.upsert_coinjoin(&session).await?;
        info!("coinjoin: session {} committed for {per_participant_amount}", session.id);
        Ok(session)
    }

    /// Frees a failed session's outpoints back to the UTXO Service's
    /// in-memory lock set. The persisted exclude set (`excluded_coinjoin_outpoints`)
    /// already stops counting a `failed` session's outpoints; this keeps the
    /// in-process lock in step with it so the same outpoint is usable again
    /// immediately, rather than only after the process restarts.
    fn release_utxos(&self, utxos: &[UtxoEntry]) {
        for utxo in utxos {
            self.utxos.release(&utxo.outpoint);
        }
    }

    /// Marks a single session `failed` from an external signal — a round
    /// timeout or an `ABORT` relayed by the Bridge (spec.md §4.5 "Rounds
    /// expire after a configurable idle timeout") — releasing its UTXO lock
    /// the same way a local verification failure does. A no-op once the
    /// session has already left the round (`completed` or `failed`).
    pub async fn fail_session(&self, session_id: &str, reason: String) -> Result<(), CoinJoinError> {
        let mut session = match self.db.get_coinjoin(session_id).await? {
            Some(session) => session,
            None => return Ok(()),
        };
        if matches!(session.status, CoinJoinStatus::Completed | CoinJoinStatus::Failed) {
            return Ok(());
        }
        if let Some(utxos) = session.revealed_utxos.clone().or_else(|| session.original_utxos.clone()) {
            self.release_utxos(&utxos);
        }
        session.status = CoinJoinStatus::Failed;
        session.error = Some(reason);
        session.wipe_reveal_material();
        session.updated_at = self.clock.now_ms();
        self.db.upsert_coinjoin(&session).await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<CoinJoinSession, CoinJoinError> {
        self.db.get_coinjoin(id).await?.ok_or_else(|| CoinJoinError::NotFound(id.to_string()))
    }

    /// Marks this process's own session `completed` once another
    /// participant's process has submitted the round's transaction (spec.md
    /// §4.4.6) — only one participant's Chain Adapter connection needs to
    /// actually see the signed transaction. Idempotent.
    pub async fn complete_session(&self, session_id: &str, tx_id: String) -> Result<(), CoinJoinError> {
        let mut session = self.get_session(session_id).await?;
        if session.status == CoinJoinStatus::Completed {
            return Ok(());
        }
        session.status = CoinJoinStatus::Completed;
        session.payout_tx_id = Some(tx_id);
        session.wipe_reveal_material();
        session.updated_at = self.clock.now_ms();
        self.db.upsert_coinjoin(&session).await?;
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<CoinJoinSession>, CoinJoinError> {
        Ok(self.db.list_coinjoin().await?)
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), CoinJoinError> {
        self.db.delete_coinjoin(id).await?;
        Ok(())
    }

    /// One-click reveal, spec.md §4.4.8: uses the session's own stored
    /// `original_utxos`/`original_destination`/`salt`. Idempotent per the
    /// §8 "Idempotent reveal" law — calling it again after success is a
    /// no-op that returns the same payload.
    pub async fn reveal(&self, session_id: &str) -> Result<RevealPayload, CoinJoinError> {
        let mut session = self.get_session(session_id).await?;

        if session.status == CoinJoinStatus::Revealed {
            return Ok(RevealPayload {
                session_id: session.id,
                destination_address: session.destination_address.unwrap_or_default(),
                salt: session.salt.unwrap_or_default(),
                utxos: session.revealed_utxos.unwrap_or_default(),
            });
        }
        if session.status != CoinJoinStatus::Committed {
            return Err(CoinJoinError::WrongState(session_id.to_string()));
        }

        let (destination_address, salt, utxos) = match (&session.original_destination, &session.salt, &session.original_utxos) {
            (Some(dest), Some(salt), Some(utxos)) => (dest.clone(), salt.clone(), utxos.clone()),
            _ => return Err(CoinJoinError::WrongState(session_id.to_string())),
        };

        if let Err(e) = verify_reveal(&session.commitment, &destination_address, &salt, &utxos, session.per_participant_amount) {
            session.status = CoinJoinStatus::Failed;
            session.error = Some(e.to_string());
            session.wipe_reveal_material();
            self.db.upsert_coinjoin(&session).await?;
            self.release_utxos(&utxos);
            return Err(e);
        }

        session.revealed_utxos = Some(utxos.clone());
        session.destination_address = Some(destination_address.clone());
        session.status = CoinJoinStatus::Revealed;
        session.updated_at = self.clock.now_ms();
        self.db.upsert_coinjoin(&session).await?;

        Ok(RevealPayload { session_id: session.id, destination_address, salt, utxos })
    }

    /// Assembles the unsigned transaction for a completed round and
    /// transitions every participating session to `building`, spec.md
    /// §4.4.4/§4.4.7.
    pub async fn build(&self, revealed: Vec<RevealedParticipant>) -> Result<AssembledTransaction, CoinJoinError> {
        no_duplicate_outpoints(&revealed)?;
        let fee_rate = self.chain.estimate_fee_rate().await?.normal;
        let assembled = assemble(&revealed, self.config.participant_count, fee_rate, self.config.mass_limit)?;

        let round_id = Uuid::new_v4().to_string();
        for participant in &revealed {
            // In a genuinely multi-process round this process only persists
            // its own session; every other participant's reveal is public
            // data relayed by the Bridge with no local record to transition.
            let mut session = match self.db.get_coinjoin(&participant.session_id).await? {
                Some(session) => session,
                None => continue,
            };
            if session.status != CoinJoinStatus::Revealed {
                return Err(CoinJoinError::WrongState(session.id));
            }
            session.status = CoinJoinStatus::Building;
            session.round_id = Some(round_id.clone());
            session.updated_at = self.clock.now_ms();
            self.db.upsert_coinjoin(&session).await?;
        }
        Ok(assembled)
    }

    /// Per-session local signing, spec.md §4.4.5. Transitions only the
    /// calling session to `signed` — every participant signs independently.
    pub async fn sign(
        &self,
        session_id: &str,
        tx: &Transaction,
        owning_session_by_input: &[String],
        private_key_hex: &str,
        expected_unsigned_id: &str,
    ) -> Result<Vec<(usize, String)>, CoinJoinError> {
        let mut session = self.get_session(session_id).await?;
        if session.status != CoinJoinStatus::Building {
            return Err(CoinJoinError::WrongState(session_id.to_string()));
        }
        let shares = signer::sign_owned_inputs(tx, owning_session_by_input, session_id, private_key_hex, expected_unsigned_id)?;

        session.status = CoinJoinStatus::Signed;
        session.updated_at = self.clock.now_ms();
        self.db.upsert_coinjoin(&session).await?;
        Ok(shares)
    }

    /// Aggregates every participant's signature shares, submits the fully
    /// signed transaction, and fans the result out across the whole round
    /// (spec.md §4.4.6). Replay-safe: a second submit of an already
    /// completed round's transaction returns `MempoolReject` without
    /// touching the Chain Adapter again (§8 "Replay resistance").
    pub async fn submit(
        &self,
        mut tx: Transaction,
        owning_session_by_input: &[String],
        signature_shares: &HashMap<usize, String>,
    ) -> Result<String, CoinJoinError> {
        for (index, input) in tx.inputs.iter_mut().enumerate() {
            match signature_shares.get(&index) {
                Some(signature) => input.signature_script = signature.clone(),
                None => return Err(CoinJoinError::MissingSignatures),
            }
        }
        let signed_id = tx.signed_id();

        {
            let mut submitted = self.submitted_tx_ids.lock().unwrap();
            if submitted.contains(&signed_id) {
                return Err(CoinJoinError::ChainAdapter(chain_adapter::ChainAdapterError::MempoolReject(
                    "transaction already submitted for this round".to_string(),
                )));
            }
            submitted.insert(signed_id.clone());
        }

        let round_session_ids: Vec<String> = {
            let mut seen = HashSet::new();
            owning_session_by_input.iter().filter(|id| seen.insert((*id).clone())).cloned().collect()
        };

        match self.chain.submit_transaction(&tx.to_hex()).await {
            Ok(tx_id) => {
                for session_id in &round_session_ids {
                    let mut session = match self.db.get_coinjoin(session_id).await? {
                        Some(session) => session,
                        None => continue,
                    };
                    session.status = CoinJoinStatus::Completed;
                    session.payout_tx_id = Some(tx_id.clone());
                    session.wipe_reveal_material();
                    session.updated_at = self.clock.now_ms();
                    self.db.upsert_coinjoin(&session).await?;
                }
                info!("coinjoin: round submitted as {tx_id}, {} sessions completed", round_session_ids.len());
                Ok(tx_id)
            },
            Err(chain_adapter::ChainAdapterError::MempoolReject(message)) => {
                let offending = tx
                    .inputs
                    .iter()
                    .zip(owning_session_by_input.iter())
                    .find(|(input, _)| message.contains(input.outpoint.to_string().as_str()))
                    .map(|(_, session_id)| session_id.clone());
                for session_id in &round_session_ids {
                    let mut session = match self.db.get_coinjoin(session_id).await? {
                        Some(session) => session,
                        None => continue,
                    };
                    session.status = CoinJoinStatus::Failed;
                    session.error = Some(match &offending {
                        Some(o) if o == session_id => format!("double-spent its revealed input: {message}"),
                        Some(o) => format!("round failed, offending session {o}: {message}"),
                        None => format!("round failed: {message}"),
                    });
                    if let Some(utxos) = &session.revealed_utxos {
                        self.release_utxos(utxos);
                    }
                    session.wipe_reveal_material();
                    session.updated_at = self.clock.now_ms();
                    self.db.upsert_coinjoin(&session).await?;
                }
                warn!("coinjoin: round rejected by mempool, offending session: {offending:?}");
                Err(CoinJoinError::ChainAdapter(chain_adapter::ChainAdapterError::MempoolReject(message)))
            },
            Err(e) => Err(CoinJoinError::ChainAdapter(e)),
        }
    }
}

/// Recomputes a reveal's commitment and checks the total contribution,
/// spec.md §4.4.3. Also callable by `coord_bridge` when it receives another
/// participant's reveal message, since both sides must apply the same check.
pub fn verify_reveal(
    commitment: &str,
    destination_address: &str,
    salt: &str,
    utxos: &[UtxoEntry],
    per_participant_amount: Sompi,
) -> Result<(), CoinJoinError> {
    let dest_hash = commitment::destination_hash(destination_address, salt);
    let pairs: Vec<(kaspa_privacy_common::model::Outpoint, Sompi)> =
        utxos.iter().map(|u| (u.outpoint.clone(), u.amount)).collect();
    let digest = commitment::utxo_digest(&pairs);
    let recomputed = commitment::commitment(&dest_hash, &digest, per_participant_amount);
    if recomputed != commitment {
        return Err(CoinJoinError::CommitmentMismatch);
    }
    let total: Sompi = utxos.iter().map(|u| u.amount).sum();
    if total != per_participant_amount {
        return Err(CoinJoinError::UnequalContribution);
    }
    Ok(())
}

/// No revealed outpoint may appear in any concurrently revealing session
/// (spec.md §4.4.3).
pub fn no_duplicate_outpoints(revealed: &[RevealedParticipant]) -> Result<(), CoinJoinError> {
    let mut seen = HashSet::new();
    for participant in revealed {
        for utxo in &participant.utxos {
            if !seen.insert(utxo.outpoint.clone()) {
                return Err(CoinJoinError::DuplicateReveal(utxo.outpoint.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_adapter::mock::MockChainAdapter;
    use kaspa_privacy_common::clock::TestClock;
    use kaspa_privacy_common::crypto;
    use privacy_db::sqlite::SqliteSessionStore;

    fn engine() -> (CoinJoinEngine<MockChainAdapter>, Arc<MockChainAdapter>) {
        let chain = Arc::new(MockChainAdapter::new());
        let db: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let clock = Arc::new(TestClock::new(1_000_000));
        let utxos = Arc::new(UtxoService::new(chain.clone()));
        (CoinJoinEngine::new(chain.clone(), db, clock, SessionConfig::default(), utxos), chain)
    }

    /// Funds a fresh throwaway source address with exactly `amount`, so
    /// `create_coinjoin`'s UTXO Service call finds an exact match without
    /// needing a self-send.
    fn funded_source(chain: &MockChainAdapter, amount: u64) -> (String, String) {
        let kp = crypto::generate_keypair();
        chain.deposit(&kp.address, amount);
        (kp.address, kp.private_key_hex)
    }

    #[tokio::test]
    async fn reveal_is_idempotent() {
        let (engine, chain) = engine();
        let (source_address, source_key) = funded_source(&chain, 100_000_000);
        let session = engine
            .create_coinjoin(&source_address, &source_key, "kaspa:dest".to_string(), Sompi(100_000_000), false)
            .await
            .unwrap();

        let first = engine.reveal(&session.id).await.unwrap();
        let second = engine.reveal(&session.id).await.unwrap();
        assert_eq!(first.destination_address, second.destination_address);
        assert_eq!(first.salt, second.salt);

        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, CoinJoinStatus::Revealed);
    }

    #[tokio::test]
    async fn rejects_an_outpoint_already_bound_to_a_prior_session() {
        let (engine, chain) = engine();
        let (source_address, source_key) = funded_source(&chain, 100_000_000);
        let first = engine
            .create_coinjoin(&source_address, &source_key, "kaspa:dest1".to_string(), Sompi(100_000_000), false)
            .await
            .unwrap();
        assert_eq!(first.status, CoinJoinStatus::Committed);

        // No other exact-amount UTXO exists at this address and a fresh
        // self-send is refused, so a second non-`force_fresh` attempt must
        // fail rather than reuse the same, already-committed outpoint.
        let err = engine
            .create_coinjoin(&source_address, &source_key, "kaspa:dest2".to_string(), Sompi(100_000_000), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoinJoinError::Utxo(_)));
    }

    #[tokio::test]
    async fn ten_party_round_completes() {
        let (engine, chain) = engine();
        let mut session_ids = Vec::new();
        let mut reveals = Vec::new();
        let mut key_by_session = HashMap::new();

        for i in 0..10 {
            let (source_address, source_key) = funded_source(&chain, 100_000_000);
            let session = engine
                .create_coinjoin(&source_address, &source_key, format!("kaspa:dest{i}"), Sompi(100_000_000), false)
                .await
                .unwrap();
            let payload = engine.reveal(&session.id).await.unwrap();
            let kp = crypto::generate_keypair();
            key_by_session.insert(session.id.clone(), kp.private_key_hex);
            reveals.push(RevealedParticipant {
                session_id: session.id.clone(),
                destination_address: payload.destination_address,
                utxos: payload.utxos,
            });
            session_ids.push(session.id);
        }

        let assembled = engine.build(reveals).await.unwrap();
        assert_eq!(assembled.tx.inputs.len(), 10);
        assert_eq!(assembled.tx.outputs.len(), 10);

        let expected_id = assembled.tx.unsigned_id();
        let mut all_shares = HashMap::new();
        for session_id in &session_ids {
            let key = &key_by_session[session_id];
            let shares = engine
                .sign(session_id, &assembled.tx, &assembled.owning_session_by_input, key, &expected_id)
                .await
                .unwrap();
            for (idx, sig) in shares {
                all_shares.insert(idx, sig);
            }
        }

        let tx_id = engine.submit(assembled.tx, &assembled.owning_session_by_input, &all_shares).await.unwrap();
        assert!(!tx_id.is_empty());
        for session_id in &session_ids {
            let session = engine.get_session(session_id).await.unwrap();
            assert_eq!(session.status, CoinJoinStatus::Completed);
            assert!(session.original_utxos.is_none());
        }
        assert_eq!(chain.submitted_transactions().len(), 1);
    }

    #[tokio::test]
    async fn double_spend_fails_the_whole_round() {
        let (engine, chain) = engine();
        let mut session_ids = Vec::new();
        let mut reveals = Vec::new();
        let mut key_by_session = HashMap::new();

        for i in 0..10 {
            let (source_address, source_key) = funded_source(&chain, 100_000_000);
            let session = engine
                .create_coinjoin(&source_address, &source_key, format!("kaspa:dest{i}"), Sompi(100_000_000), false)
                .await
                .unwrap();
            let payload = engine.reveal(&session.id).await.unwrap();
            let kp = crypto::generate_keypair();
            key_by_session.insert(session.id.clone(), kp.private_key_hex);
            reveals.push(RevealedParticipant {
                session_id: session.id.clone(),
                destination_address: payload.destination_address,
                utxos: payload.utxos,
            });
            session_ids.push(session.id);
        }

        let assembled = engine.build(reveals).await.unwrap();
        chain.force_mempool_reject(&assembled.tx.inputs[3].outpoint);

        let expected_id = assembled.tx.unsigned_id();
        let mut all_shares = HashMap::new();
        for session_id in &session_ids {
            let key = &key_by_session[session_id];
            let shares = engine
                .sign(session_id, &assembled.tx, &assembled.owning_session_by_input, key, &expected_id)
                .await
                .unwrap();
            for (idx, sig) in shares {
                all_shares.insert(idx, sig);
            }
        }

        let result = engine.submit(assembled.tx, &assembled.owning_session_by_input, &all_shares).await;
        assert!(result.is_err());
        for session_id in &session_ids {
            let session = engine.get_session(session_id).await.unwrap();
            assert_eq!(session.status, CoinJoinStatus::Failed);
        }
    }

    #[tokio::test]
    async fn fail_session_releases_the_utxo_and_is_idempotent() {
        let (engine, chain) = engine();
        let (source_address, source_key) = funded_source(&chain, 100_000_000);
        let session =
            engine.create_coinjoin(&source_address, &source_key, "kaspa:dest".to_string(), Sompi(100_000_000), false).await.unwrap();

        engine.fail_session(&session.id, "round timed out".to_string()).await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, CoinJoinStatus::Failed);
        assert_eq!(refreshed.error.as_deref(), Some("round timed out"));

        // The released outpoint can now back a fresh session.
        let second =
            engine.create_coinjoin(&source_address, &source_key, "kaspa:dest2".to_string(), Sompi(100_000_000), false).await.unwrap();
        assert_eq!(second.status, CoinJoinStatus::Committed);

        // Calling it again on an already-failed session is a no-op, not an error.
        engine.fail_session(&session.id, "second call".to_string()).await.unwrap();
        let refreshed_again = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed_again.error.as_deref(), Some("round timed out"));
    }

    /// Mirrors a genuinely multi-process round: this engine's db only holds
    /// session `"s0"`; every other participant's reveal is public data with
    /// no local record. `build`/`submit` must transition only what they own.
    #[tokio::test]
    async fn build_and_submit_skip_sessions_this_process_does_not_own() {
        let (engine, chain) = engine();
        let (source_address, source_key) = funded_source(&chain, 100_000_000);
        let session =
            engine.create_coinjoin(&source_address, &source_key, "kaspa:dest0".to_string(), Sompi(100_000_000), false).await.unwrap();
        let own_reveal = engine.reveal(&session.id).await.unwrap();

        let mut reveals = vec![RevealedParticipant {
            session_id: session.id.clone(),
            destination_address: own_reveal.destination_address,
            utxos: own_reveal.utxos,
        }];
        let mut key_by_session = HashMap::new();
        let own_kp = crypto::generate_keypair();
        key_by_session.insert(session.id.clone(), own_kp.private_key_hex);

        for i in 1..10 {
            let foreign_id = format!("foreign-session-{i}");
            let kp = crypto::generate_keypair();
            let utxo = UtxoEntry {
                outpoint: kaspa_privacy_common::model::Outpoint::new(format!("{i}").repeat(32), 0),
                amount: Sompi(100_000_000),
                script_public_key: "spk".to_string(),
                block_daa_score: 0,
                is_coinbase: false,
            };
            key_by_session.insert(foreign_id.clone(), kp.private_key_hex);
            reveals.push(RevealedParticipant {
                session_id: foreign_id,
                destination_address: format!("kaspa:dest{i}"),
                utxos: vec![utxo],
            });
        }

        let assembled = engine.build(reveals).await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, CoinJoinStatus::Building);

        let expected_id = assembled.tx.unsigned_id();
        let mut all_shares = HashMap::new();
        for (idx, session_id) in assembled.owning_session_by_input.iter().enumerate() {
            let key = &key_by_session[session_id];
            if session_id == &session.id {
                let shares =
                    engine.sign(session_id, &assembled.tx, &assembled.owning_session_by_input, key, &expected_id).await.unwrap();
                for (i, sig) in shares {
                    all_shares.insert(i, sig);
                }
            } else {
                // A foreign participant signs with its own engine/process;
                // this test stands in with a plain signature computation.
                let sig = signer::sign_owned_inputs(
                    &assembled.tx,
                    &assembled.owning_session_by_input,
                    session_id,
                    key,
                    &expected_id,
                )
                .unwrap();
                for (i, s) in sig {
                    all_shares.insert(i, s);
                }
            }
            let _ = idx;
        }

        let tx_id = engine.submit(assembled.tx, &assembled.owning_session_by_input, &all_shares).await.unwrap();
        assert!(!tx_id.is_empty());
        let completed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(completed.status, CoinJoinStatus::Completed);
    }
}
