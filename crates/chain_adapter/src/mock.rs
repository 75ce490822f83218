//! An in-memory Chain Adapter, the equivalent of the teacher's
//! `coins/test_coin.rs` — used by every other crate's unit/integration
//! tests so they never touch a real node.

use crate::{BalanceInfo, ChainAdapter, ChainAdapterError, FeeEstimate};
use async_trait::async_trait;
use kaspa_privacy_common::model::{Outpoint, UtxoEntry};
use kaspa_privacy_common::tx::Transaction;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    utxos_by_address: HashMap<String, Vec<UtxoEntry>>,
    mempool: HashSet<String>,
    submitted: Vec<Transaction>,
    tip_daa_score: u64,
    fee: FeeEstimate,
    /// tx ids that must bounce with `SequenceLock` exactly once before
    /// succeeding, so tests can exercise the Scheduler retry budget
    /// (spec.md §8 scenario 2).
    force_sequence_lock_once: HashSet<String>,
    force_mempool_reject: HashSet<String>,
    /// destination addresses whose next submitted transaction (matched by
    /// first output) must bounce with `SequenceLock` exactly once, for tests
    /// that cannot predict a transaction id ahead of the signing it's built
    /// from (spec.md §8 scenario 2).
    force_sequence_lock_for_output: HashSet<String>,
}

/// Deterministic, address-keyed fake chain. `Mutex` rather than `RwLock`
/// because every operation mutates (submissions, balance snapshots).
pub struct MockChainAdapter {
    state: Mutex<MockState>,
}

impl Default for MockChainAdapter {
    fn default() -> Self {
        MockChainAdapter {
            state: Mutex::new(MockState {
                fee: FeeEstimate { low: 1, normal: 2, high: 4 },
                ..Default::default()
            }),
        }
    }
}

impl MockChainAdapter {
    pub fn new() -> Self { Self::default() }

    /// Test helper: credits `address` with a UTXO of `amount` from a
    /// freshly-minted fake deposit transaction, returning its outpoint.
    pub fn deposit(&self, address: &str, amount: u64) -> Outpoint {
        let mut state = self.state.lock().unwrap();
        let tx_id = format!("{:064x}", rand_like(state.utxos_by_address.values().map(Vec::len).sum::<usize>() as u64));
        let outpoint = Outpoint::new(tx_id, 0);
        state.utxos_by_address.entry(address.to_string()).or_default().push(UtxoEntry {
            outpoint: outpoint.clone(),
            amount: kaspa_privacy_common::amount::Sompi(amount),
            script_public_key: address.to_string(),
            block_daa_score: state.tip_daa_score,
            is_coinbase: false,
        });
        outpoint
    }

    pub fn advance_tip(&self, by: u64) {
        let mut state = self.state.lock().unwrap();
        state.tip_daa_score += by;
    }

    pub fn set_fee(&self, fee: FeeEstimate) { self.state.lock().unwrap().fee = fee; }

    pub fn force_sequence_lock_once(&self, tx_id: &str) {
        self.state.lock().unwrap().force_sequence_lock_once.insert(tx_id.to_string());
    }

    pub fn force_sequence_lock_for_output(&self, address: &str) {
        self.state.lock().unwrap().force_sequence_lock_for_output.insert(address.to_string());
    }

    pub fn force_mempool_reject(&self, outpoint: &Outpoint) {
        self.state
            .lock()
            .unwrap()
            .force_mempool_reject
            .insert(format!("{outpoint}"));
    }

    pub fn submitted_transactions(&self) -> Vec<Transaction> { self.state.lock().unwrap().submitted.clone() }

    /// Removes a UTXO out from under a pending spend, simulating an
    /// external double-spend (spec.md §8 scenario 5).
    pub fn externally_spend(&self, address: &str, outpoint: &Outpoint) {
        let mut state = self.state.lock().unwrap();
        if let Some(utxos) = state.utxos_by_address.get_mut(address) {
            utxos.retain(|u| &u.outpoint != outpoint);
        }
    }
}

fn rand_like(seed: u64) -> u64 {
    seed.wrapping_mul(2_685_821_657_736_338_717).wrapping_add(0x9E3779B97F4A7C15)
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    async fn get_utxos(&self, address: &str) -> Result<HashSet<UtxoEntry>, ChainAdapterError> {
        let state = self.state.lock().unwrap();
        Ok(state.utxos_by_address.get(address).cloned().unwrap_or_default().into_iter().collect())
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceInfo, ChainAdapterError> {
        let state = self.state.lock().unwrap();
        let utxos = state.utxos_by_address.get(address).cloned().unwrap_or_default();
        let confirmed: u64 = utxos.iter().map(|u| u.amount.0).sum();
        Ok(BalanceInfo {
            confirmed,
            unconfirmed: 0,
            mature: confirmed,
            utxo_count: utxos.len(),
            last_updated: state.tip_daa_score,
        })
    }

    async fn submit_transaction(&self, signed_tx_hex: &str) -> Result<String, ChainAdapterError> {
        let tx = Transaction::from_hex(signed_tx_hex)
            .map_err(ChainAdapterError::MalformedResponse)?;
        let tx_id = tx.signed_id();

        let mut state = self.state.lock().unwrap();
        if state.force_sequence_lock_once.remove(&tx_id) {
            return Err(ChainAdapterError::SequenceLock);
        }
        if let Some(first_output) = tx.outputs.first() {
            if state.force_sequence_lock_for_output.remove(&first_output.script_public_key) {
                return Err(ChainAdapterError::SequenceLock);
            }
        }
        for input in &tx.inputs {
            if state.force_mempool_reject.remove(&format!("{}", input.outpoint)) {
                return Err(ChainAdapterError::MempoolReject(format!(
                    "double spend of {}",
                    input.outpoint
                )));
            }
        }

        // Remove spent inputs, credit outputs at output index == position.
        for (_, utxos) in state.utxos_by_address.iter_mut() {
            utxos.retain(|u| !tx.inputs.iter().any(|i| i.outpoint == u.outpoint));
        }
        for (idx, output) in tx.outputs.iter().enumerate() {
            state
                .utxos_by_address
                .entry(output.script_public_key.clone())
                .or_default()
                .push(UtxoEntry {
                    outpoint: Outpoint::new(tx_id.clone(), idx as u32),
                    amount: output.amount,
                    script_public_key: output.script_public_key.clone(),
                    block_daa_score: state.tip_daa_score,
                    is_coinbase: false,
                });
        }
        state.mempool.insert(tx_id.clone());
        state.submitted.push(tx);
        Ok(tx_id)
    }

    async fn is_in_mempool(&self, tx_id: &str) -> Result<bool, ChainAdapterError> {
        Ok(self.state.lock().unwrap().mempool.contains(tx_id))
    }

    async fn wait_for_output(
        &self,
        tx_id: &str,
        index: u32,
        timeout: Duration,
    ) -> Result<UtxoEntry, ChainAdapterError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            {
                let state = self.state.lock().unwrap();
                for utxos in state.utxos_by_address.values() {
                    if let Some(found) = utxos
                        .iter()
                        .find(|u| u.outpoint.transaction_id == tx_id && u.outpoint.output_index == index)
                    {
                        return Ok(found.clone());
                    }
                }
            }
            if std::time::Instant::now() >= deadline {
                return Err(ChainAdapterError::TimedOut);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn tip_daa_score(&self) -> Result<u64, ChainAdapterError> {
        Ok(self.state.lock().unwrap().tip_daa_score)
    }

    async fn estimate_fee_rate(&self) -> Result<FeeEstimate, ChainAdapterError> {
        Ok(self.state.lock().unwrap().fee)
    }
}

impl Default for FeeEstimate {
    fn default() -> Self { FeeEstimate { low: 1, normal: 2, high: 4 } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deposit_then_fetch() {
        let adapter = MockChainAdapter::new();
        adapter.deposit("kaspa:addr1", 100_000_000);
        let utxos = adapter.get_utxos("kaspa:addr1").await.unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos.into_iter().next().unwrap().amount.0, 100_000_000);
    }
}
