//! The wire message set, spec.md §4.5. JSON, fixed schema, binary fields
//! hex-encoded and lowercase — matches the rest of the workspace's
//! persisted-document convention.

use kaspa_privacy_common::amount::Sompi;
use kaspa_privacy_common::model::UtxoEntry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "JOIN")]
    Join { amount: Sompi, commitment: String, destination_hash: String, session_id: String },
    #[serde(rename = "REVEAL")]
    Reveal { round_id: String, session_id: String, destination_address: String, salt: String, utxos: Vec<UtxoEntry> },
    #[serde(rename = "SIG_SHARE")]
    SigShare { round_id: String, owning_session: String, input_indices: Vec<usize>, signatures: Vec<String> },
    #[serde(rename = "SUBMITTED")]
    Submitted { round_id: String, tx_id: String },
    #[serde(rename = "ABORT")]
    Abort { round_id: String, reason: String, offending_session: Option<String> },
}

impl BridgeMessage {
    pub fn round_id(&self) -> Option<&str> {
        match self {
            BridgeMessage::Join { .. } => None,
            BridgeMessage::Reveal { round_id, .. }
            | BridgeMessage::SigShare { round_id, .. }
            | BridgeMessage::Submitted { round_id, .. }
            | BridgeMessage::Abort { round_id, .. } => Some(round_id),
        }
    }

    /// The phase a message belongs to, for the ordering check in
    /// [`crate::round::RoundState::accept`].
    pub fn phase(&self) -> MessagePhase {
        match self {
            BridgeMessage::Join { .. } => MessagePhase::Join,
            BridgeMessage::Reveal { .. } => MessagePhase::Reveal,
            BridgeMessage::SigShare { .. } => MessagePhase::Sign,
            BridgeMessage::Submitted { .. } => MessagePhase::Submit,
            BridgeMessage::Abort { .. } => MessagePhase::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessagePhase {
    Join,
    Reveal,
    Sign,
    Submit,
    Abort,
}
