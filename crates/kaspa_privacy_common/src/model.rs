//! The shared data model, spec.md §3. Plain structs, no cyclic references:
//! sessions reference outpoints by value, rounds reference sessions by id.

use crate::amount::Sompi;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SCHEMA_VERSION: u32 = 1;

/// `(transaction_id, output_index)`. Equality by both fields; `tx_id` is
/// lowercase hex of a 32-byte hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub transaction_id: String,
    pub output_index: u32,
}

impl Outpoint {
    pub fn new(transaction_id: impl Into<String>, output_index: u32) -> Self {
        Outpoint {
            transaction_id: transaction_id.into().to_lowercase(),
            output_index,
        }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

/// Immutable UTXO entry, spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub outpoint: Outpoint,
    pub amount: Sompi,
    pub script_public_key: String,
    pub block_daa_score: u64,
    pub is_coinbase: bool,
}

/// One `(address, amount)` payout line. Destinations are ordered and that
/// order must be preserved end to end (spec.md §4.2 payout ordering rule).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub amount: Sompi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixingStatus {
    Waiting,
    DepositReceived,
    SentToIntermediate,
    IntermediateConfirmed,
    Confirmed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixingSession {
    pub id: String,
    pub destinations: Vec<Destination>,
    pub amount: Sompi,
    pub deposit_address: String,
    pub deposit_private_key: String,
    pub intermediate_address: String,
    pub intermediate_private_key: String,
    pub status: MixingStatus,
    pub deposit_tx_id: Option<String>,
    pub intermediate_tx_id: Option<String>,
    pub payout_tx_ids: Vec<String>,
    pub intermediate_confirmed: bool,
    pub intermediate_delay_until: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
    pub error: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 { SCHEMA_VERSION }

impl MixingSession {
    /// Redacts the two ephemeral private keys, for any surface other than
    /// the explicit `export_keys` control operation (spec.md §3/§4.6).
    pub fn redacted(mut self) -> Self {
        self.deposit_private_key = "<redacted>".to_string();
        self.intermediate_private_key = "<redacted>".to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinJoinStatus {
    Committed,
    Revealed,
    Building,
    Signed,
    Submitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinJoinSession {
    pub id: String,
    pub per_participant_amount: Sompi,
    /// `H(destination_address || outpoint_list || salt || per_participant_amount)`,
    /// spec.md §4.4.1.
    pub commitment: String,
    /// `H(destination_address || salt)`, published alongside `commitment`.
    pub destination_hash: String,
    /// Local-only fields, used for one-click reveal (spec.md §4.4.8). Wiped
    /// on completion/failure. Stores full entries, not bare outpoints,
    /// because the commitment's `utxo_digest` is computed over amounts too
    /// (spec.md §4.4.1).
    pub original_utxos: Option<Vec<UtxoEntry>>,
    pub original_destination: Option<String>,
    pub salt: Option<String>,
    pub status: CoinJoinStatus,
    pub revealed_utxos: Option<Vec<UtxoEntry>>,
    pub destination_address: Option<String>,
    pub round_id: Option<String>,
    pub payout_tx_id: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub error: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl CoinJoinSession {
    /// Wipes the one-click-reveal fields, required on transition to
    /// `completed` or `failed` (spec.md §4.4.8).
    pub fn wipe_reveal_material(&mut self) {
        self.original_utxos = None;
        self.original_destination = None;
        self.salt = None;
    }
}
