//! A minimal transaction representation used to drive the two privacy
//! engines. Real Kaspa consensus encoding is explicitly a Non-goal
//! (spec.md §1); the Chain Adapter's contract only requires that whatever it
//! submits round-trips through `tx_id`/`wait_for_output` (spec.md §4.1), so
//! this crate defines its own canonical, hex-encoded wire shape and treats
//! the node boundary as opaque beyond that.

use crate::amount::Sompi;
use crate::model::Outpoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: Outpoint,
    /// Empty until signed.
    pub signature_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub script_public_key: String,
    pub amount: Sompi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// A stable id independent of signature scripts, so it matches what the
    /// assembler publishes before signing (spec.md §4.4.5 "refuse to sign if
    /// the rebuilt transaction hash differs from the hash the assembler
    /// published").
    pub fn unsigned_id(&self) -> String {
        let mut hasher = Sha256::new();
        for input in &self.inputs {
            hasher.update(input.outpoint.transaction_id.as_bytes());
            hasher.update(input.outpoint.output_index.to_be_bytes());
        }
        for output in &self.outputs {
            hasher.update(output.script_public_key.as_bytes());
            hasher.update(output.amount.0.to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// The id once fully signed — includes signature scripts so a
    /// double-submission of the exact same signed bytes is detectable.
    pub fn signed_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.unsigned_id().as_bytes());
        for input in &self.inputs {
            hasher.update(input.signature_script.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn to_hex(&self) -> String {
        let json = serde_json::to_vec(self).expect("transaction always serializes");
        hex::encode(json)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
        serde_json::from_slice(&bytes).map_err(|e| e.to_string())
    }

    pub fn total_input(&self, inputs_by_outpoint: &std::collections::HashMap<Outpoint, Sompi>) -> Option<Sompi> {
        self.inputs
            .iter()
            .try_fold(Sompi::ZERO, |acc, i| inputs_by_outpoint.get(&i.outpoint).map(|a| acc + *a))
    }

    pub fn total_output(&self) -> Sompi { self.outputs.iter().map(|o| o.amount).sum() }
}
