//! The only crate that talks to a node. Every other engine imports
//! [`ChainAdapter`], never an RPC type directly — spec.md §4.1.

pub mod errors;
pub mod kaspa_ws;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use async_trait::async_trait;
use kaspa_privacy_common::model::UtxoEntry;
use std::collections::HashSet;
use std::time::Duration;

pub use errors::ChainAdapterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRateTier {
    Low,
    Normal,
    High,
}

/// sompi-per-byte estimates for each tier, spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeeEstimate {
    pub low: u64,
    pub normal: u64,
    pub high: u64,
}

impl FeeEstimate {
    pub fn tier(&self, tier: FeeRateTier) -> u64 {
        match tier {
            FeeRateTier::Low => self.low,
            FeeRateTier::Normal => self.normal,
            FeeRateTier::High => self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BalanceInfo {
    pub confirmed: u64,
    pub unconfirmed: u64,
    pub mature: u64,
    pub utxo_count: usize,
    pub last_updated: u64,
}

/// The Chain Adapter contract, spec.md §4.1. Blocking I/O happens behind
/// these `async fn`s; callers never see RPC wire types.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn get_utxos(&self, address: &str) -> Result<HashSet<UtxoEntry>, ChainAdapterError>;

    async fn get_balance(&self, address: &str) -> Result<BalanceInfo, ChainAdapterError>;

    /// Submits a signed, fully serialized transaction (hex-encoded) and
    /// returns its id.
    async fn submit_transaction(&self, signed_tx_hex: &str) -> Result<String, ChainAdapterError>;

    async fn is_in_mempool(&self, tx_id: &str) -> Result<bool, ChainAdapterError>;

    /// Polls at a bounded interval until output `index` of `tx_id` is
    /// visible, or `timeout` elapses.
    async fn wait_for_output(
        &self,
        tx_id: &str,
        index: u32,
        timeout: Duration,
    ) -> Result<UtxoEntry, ChainAdapterError>;

    /// Current virtual-DAA-score tip, used by monitors as a monotonic clock
    /// (spec.md §GLOSSARY "DAA score").
    async fn tip_daa_score(&self) -> Result<u64, ChainAdapterError>;

    async fn estimate_fee_rate(&self) -> Result<FeeEstimate, ChainAdapterError>;
}

impl std::hash::Hash for UtxoEntry {
    /// Hashes by outpoint only: two entries for the same outpoint are the
    /// same UTXO even if other fields were re-derived from a different RPC
    /// response shape.
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.outpoint.hash(state); }
}
