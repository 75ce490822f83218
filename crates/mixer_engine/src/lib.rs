//! Multi-hop mixing sessions (spec.md §4.2): deposit → intermediate hop →
//! delayed payout. Two cooperative watcher ticks drive every session through
//! its states; both are meant to be invoked periodically by the Scheduler
//! crate rather than looping internally, mirroring the teacher's
//! `maker_swap_v2`/`taker_swap_v2` "poll on tick" shape without the
//! event-sourced replay machinery those use.

pub mod errors;

pub use errors::MixerError;

use chain_adapter::ChainAdapter;
use kaspa_privacy_common::amount::Sompi;
use kaspa_privacy_common::clock::Clock;
use kaspa_privacy_common::config::SessionConfig;
use kaspa_privacy_common::crypto;
use kaspa_privacy_common::model::{Destination, MixingSession, MixingStatus};
use kaspa_privacy_common::tx::{Transaction, TxInput, TxOutput};
use kaspa_privacy_common::{info, warn};
use privacy_db::SessionStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct MixerEngine<C: ChainAdapter> {
    chain: Arc<C>,
    db: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl<C: ChainAdapter> MixerEngine<C> {
    pub fn new(chain: Arc<C>, db: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        MixerEngine { chain, db, clock, config }
    }

    /// Creates a fresh `waiting` session with two throwaway keypairs, per
    /// spec.md §3 (a session owns both the deposit and intermediate keys).
    pub async fn create_session(
        &self,
        destinations: Vec<Destination>,
        amount: Sompi,
    ) -> Result<MixingSession, MixerError> {
        let deposit = crypto::generate_keypair();
        let intermediate = crypto::generate_keypair();
        let now = self.clock.now_ms();
        let session = MixingSession {
            id: Uuid::new_v4().to_string(),
            destinations,
            amount,
            deposit_address: deposit.address,
            deposit_private_key: deposit.private_key_hex,
            intermediate_address: intermediate.address,
            intermediate_private_key: intermediate.private_key_hex,
            status: MixingStatus::Waiting,
            deposit_tx_id: None,
            intermediate_tx_id: None,
            payout_tx_ids: Vec::new(),
            intermediate_confirmed: false,
            intermediate_delay_until: None,
            created_at: now,
            updated_at: now,
            error: None,
            schema_version: kaspa_privacy_common::model::SCHEMA_VERSION,
        };
        self.db.upsert_mixing(&session).await?;
        info!("mixer: created session {} waiting for {}", session.id, session.amount);
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Result<MixingSession, MixerError> {
        self.db.get_mixing(id).await?.ok_or_else(|| MixerError::NotFound(id.to_string()))
    }

    pub async fn list_sessions(&self) -> Result<Vec<MixingSession>, MixerError> {
        Ok(self.db.list_mixing().await?)
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), MixerError> {
        self.db.delete_mixing(id).await?;
        Ok(())
    }

    /// Deposit watcher tick, spec.md §4.2 step 1-3. Iterates every `waiting`
    /// session, sweeps any that have received their full deposit to the
    /// intermediate address.
    pub async fn tick_deposit_watcher(&self) -> Result<(), MixerError> {
        for session in self.db.list_mixing().await? {
            if !matches!(session.status, MixingStatus::Waiting | MixingStatus::DepositReceived) {
                continue;
            }
            if let Err(e) = self.advance_deposit(session).await {
                warn!("mixer: deposit watcher step failed: {e}");
            }
        }
        Ok(())
    }

    /// Handles both the `waiting -> deposit_received` transition and, on a
    /// session already sitting at `deposit_received` (a prior sweep bounced
    /// with `SequenceLock`), the retried sweep submit itself.
    async fn advance_deposit(&self, mut session: MixingSession) -> Result<(), MixerError> {
        let utxos = self.chain.get_utxos(&session.deposit_address).await?;
        let observed: Sompi = utxos.iter().map(|u| u.amount).sum();
        if observed < session.amount {
            return Ok(());
        }

        if session.status == MixingStatus::Waiting {
            // Lowest `block_daa_score` is the earliest-confirmed UTXO (spec.md
            // §4.2 step 2) — transaction ids are hashes and carry no ordering.
            let earliest = utxos
                .iter()
                .min_by_key(|u| u.block_daa_score)
                .map(|u| u.outpoint.transaction_id.clone());
            session.deposit_tx_id = earliest;
            session.status = MixingStatus::DepositReceived;
            session.updated_at = self.clock.now_ms();
            self.db.upsert_mixing(&session).await?;
        }

        let fee_rate = self.chain.estimate_fee_rate().await?.normal;
        let fee = Sompi(fee_rate.saturating_mul(250));
        let sweep_amount = observed.checked_sub(fee).unwrap_or(Sompi::ZERO);
        if sweep_amount.is_zero() {
            session.status = MixingStatus::Error;
            session.error = Some("deposit balance too small to cover sweep fee".to_string());
            self.db.upsert_mixing(&session).await?;
            return Ok(());
        }

        let mut tx = Transaction {
            inputs: utxos
                .iter()
                .map(|u| TxInput { outpoint: u.outpoint.clone(), signature_script: String::new() })
                .collect(),
            outputs: vec![TxOutput { script_public_key: session.intermediate_address.clone(), amount: sweep_amount }],
        };
        let digest = crypto::sighash(tx.unsigned_id().as_bytes());
        let signature =
            crypto::sign_digest(&session.deposit_private_key, &digest).map_err(MixerError::Signing)?;
        for input in &mut tx.inputs {
            input.signature_script = signature.clone();
        }

        match self.chain.submit_transaction(&tx.to_hex()).await {
            Ok(tx_id) => {
                session.intermediate_tx_id = Some(tx_id.clone());
                session.status = MixingStatus::SentToIntermediate;
                session.updated_at = self.clock.now_ms();
                self.db.upsert_mixing(&session).await?;
                info!("mixer: session {} swept to intermediate via {tx_id}", session.id);
            },
            Err(chain_adapter::ChainAdapterError::SequenceLock) => {
                // Left in `deposit_received`; the Scheduler retries the tick.
                self.db.upsert_mixing(&session).await?;
            },
            Err(e) => {
                session.status = MixingStatus::Error;
                session.error = Some(e.to_string());
                self.db.upsert_mixing(&session).await?;
            },
        }
        Ok(())
    }

    /// Intermediate watcher tick, spec.md §4.2 step 1-3: confirms the sweep,
    /// waits out the configured delay, then pays the user-supplied
    /// destinations in the order they were given.
    pub async fn tick_intermediate_watcher(&self) -> Result<(), MixerError> {
        for session in self.db.list_mixing().await? {
            if session.status != MixingStatus::SentToIntermediate {
                continue;
            }
            if let Err(e) = self.advance_intermediate(session).await {
                warn!("mixer: intermediate watcher step failed: {e}");
            }
        }
        Ok(())
    }

    async fn advance_intermediate(&self, mut session: MixingSession) -> Result<(), MixerError> {
        let tx_id = match &session.intermediate_tx_id {
            Some(id) => id.clone(),
            None => return Err(MixerError::WrongState(session.id.clone())),
        };

        if !session.intermediate_confirmed {
            if !self.chain.is_in_mempool(&tx_id).await? {
                return Ok(());
            }
            let found = self.chain.wait_for_output(&tx_id, 0, std::time::Duration::from_millis(1)).await;
            if found.is_err() {
                return Ok(());
            }
            session.intermediate_confirmed = true;
            session.status = MixingStatus::IntermediateConfirmed;
            session.intermediate_delay_until = Some(self.clock.now_ms() + self.config.intermediate_delay_ms);
            session.updated_at = self.clock.now_ms();
            self.db.upsert_mixing(&session).await?;
            return Ok(());
        }

        let delay_until = session.intermediate_delay_until.unwrap_or(0);
        if self.clock.now_ms() < delay_until {
            return Ok(());
        }

        let utxo = self.chain.wait_for_output(&tx_id, 0, std::time::Duration::from_millis(1)).await?;
        let total_payout: Sompi = session.destinations.iter().map(|d| d.amount).sum();
        if total_payout > utxo.amount {
            session.status = MixingStatus::Error;
            session.error = Some("destinations exceed the confirmed intermediate balance".to_string());
            self.db.upsert_mixing(&session).await?;
            return Ok(());
        }

        // Payout ordering rule (§4.2): destinations keep the caller's order,
        // any dust remainder is folded into the fee rather than reordered in.
        let mut tx = Transaction {
            inputs: vec![TxInput { outpoint: utxo.outpoint.clone(), signature_script: String::new() }],
            outputs: session
                .destinations
                .iter()
                .map(|d| TxOutput { script_public_key: d.address.clone(), amount: d.amount })
                .collect(),
        };
        let digest = crypto::sighash(tx.unsigned_id().as_bytes());
        let signature =
            crypto::sign_digest(&session.intermediate_private_key, &digest).map_err(MixerError::Signing)?;
        for input in &mut tx.inputs {
            input.signature_script = signature.clone();
        }

        match self.chain.submit_transaction(&tx.to_hex()).await {
            Ok(payout_tx_id) => {
                session.payout_tx_ids.push(payout_tx_id);
                session.status = MixingStatus::Confirmed;
                session.updated_at = self.clock.now_ms();
                self.db.upsert_mixing(&session).await?;
                info!("mixer: session {} paid out", session.id);
            },
            Err(chain_adapter::ChainAdapterError::SequenceLock) => {
                self.db.upsert_mixing(&session).await?;
            },
            Err(e) => {
                session.status = MixingStatus::Error;
                session.error = Some(e.to_string());
                self.db.upsert_mixing(&session).await?;
            },
        }
        Ok(())
    }

    /// Manual retry through the Control Surface (§4.2 "Failure recovery"):
    /// clears the error and puts the session back a step so the next tick
    /// picks it up again.
    pub async fn retry(&self, id: &str) -> Result<(), MixerError> {
        let mut session = self.get_session(id).await?;
        if session.status != MixingStatus::Error {
            return Err(MixerError::WrongState(id.to_string()));
        }
        session.status = if session.intermediate_tx_id.is_some() {
            MixingStatus::SentToIntermediate
        } else if session.deposit_tx_id.is_some() {
            MixingStatus::DepositReceived
        } else {
            MixingStatus::Waiting
        };
        session.error = None;
        session.updated_at = self.clock.now_ms();
        self.db.upsert_mixing(&session).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_adapter::mock::MockChainAdapter;
    use kaspa_privacy_common::clock::TestClock;
    use privacy_db::sqlite::SqliteSessionStore;

    fn engine() -> (MixerEngine<MockChainAdapter>, Arc<MockChainAdapter>, Arc<TestClock>) {
        let chain = Arc::new(MockChainAdapter::new());
        let db: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let clock = Arc::new(TestClock::new(1_000_000));
        let engine = MixerEngine::new(chain.clone(), db, clock.clone(), SessionConfig::default());
        (engine, chain, clock)
    }

    #[tokio::test]
    async fn full_cycle_pays_out_in_order() {
        let (engine, chain, clock) = engine();
        let destinations = vec![
            Destination { address: "kaspa:dest1".to_string(), amount: Sompi(60_000_000) },
            Destination { address: "kaspa:dest2".to_string(), amount: Sompi(30_000_000) },
        ];
        let session = engine.create_session(destinations.clone(), Sompi(90_000_000)).await.unwrap();

        chain.deposit(&session.deposit_address, 90_000_000);
        engine.tick_deposit_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, MixingStatus::SentToIntermediate);

        chain.advance_tip(10);
        engine.tick_intermediate_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, MixingStatus::IntermediateConfirmed);
        assert!(refreshed.intermediate_delay_until.unwrap() > clock.now_ms());

        clock.advance_ms(SessionConfig::default().intermediate_delay_ms + 1);
        engine.tick_intermediate_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, MixingStatus::Confirmed);
        assert_eq!(refreshed.payout_tx_ids.len(), 1);

        let submitted = chain.submitted_transactions();
        let payout = submitted.last().unwrap();
        assert_eq!(payout.outputs[0].script_public_key, "kaspa:dest1");
        assert_eq!(payout.outputs[1].script_public_key, "kaspa:dest2");
    }

    #[tokio::test]
    async fn waiting_session_ignored_until_fully_funded() {
        let (engine, chain, _clock) = engine();
        let session = engine
            .create_session(vec![Destination { address: "kaspa:dest1".to_string(), amount: Sompi(10) }], Sompi(90_000_000))
            .await
            .unwrap();
        chain.deposit(&session.deposit_address, 10_000_000);
        engine.tick_deposit_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, MixingStatus::Waiting);
    }

    #[tokio::test]
    async fn retries_sweep_after_sequence_lock() {
        let (engine, chain, _clock) = engine();
        let session = engine
            .create_session(vec![Destination { address: "kaspa:dest1".to_string(), amount: Sompi(10) }], Sompi(90_000_000))
            .await
            .unwrap();
        chain.deposit(&session.deposit_address, 90_000_000);
        chain.force_sequence_lock_for_output(&session.intermediate_address);

        engine.tick_deposit_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, MixingStatus::DepositReceived);
        assert!(refreshed.intermediate_tx_id.is_none());

        engine.tick_deposit_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.status, MixingStatus::SentToIntermediate);
        assert!(refreshed.intermediate_tx_id.is_some());
    }

    /// `deposit_tx_id` must track confirmation order, not the lexicographic
    /// order of the (effectively random) transaction hashes.
    #[tokio::test]
    async fn deposit_tx_id_picks_the_earliest_confirmed_utxo_by_daa_score() {
        let (engine, chain, _clock) = engine();
        let session = engine
            .create_session(vec![Destination { address: "kaspa:dest1".to_string(), amount: Sompi(10) }], Sompi(90_000_000))
            .await
            .unwrap();

        let first = chain.deposit(&session.deposit_address, 40_000_000);
        chain.advance_tip(5);
        chain.deposit(&session.deposit_address, 50_000_000);

        engine.tick_deposit_watcher().await.unwrap();
        let refreshed = engine.get_session(&session.id).await.unwrap();
        assert_eq!(refreshed.deposit_tx_id.as_deref(), Some(first.transaction_id.as_str()));
    }
}
