//! `stats()`, spec.md §4.6b: counts-by-status for both session kinds in a
//! single pass over whatever the engines already loaded, grounded on the
//! teacher's `lp_stats.rs` counters-by-key pattern (a plain `HashMap<K, u64>`
//! bumped per observation, serialized as-is rather than a fixed struct of
//! named fields).

use kaspa_privacy_common::model::{CoinJoinSession, CoinJoinStatus, MixingSession, MixingStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Stats {
    pub mixing: HashMap<String, u64>,
    pub coinjoin: HashMap<String, u64>,
}

impl Stats {
    pub fn from_sessions(mixing: &[MixingSession], coinjoin: &[CoinJoinSession]) -> Self {
        let mut stats = Stats::default();
        for session in mixing {
            *stats.mixing.entry(mixing_status_key(session.status).to_string()).or_insert(0) += 1;
        }
        for session in coinjoin {
            *stats.coinjoin.entry(coinjoin_status_key(session.status).to_string()).or_insert(0) += 1;
        }
        stats
    }
}

fn mixing_status_key(status: MixingStatus) -> &'static str {
    match status {
        MixingStatus::Waiting => "waiting",
        MixingStatus::DepositReceived => "deposit_received",
        MixingStatus::SentToIntermediate => "sent_to_intermediate",
        MixingStatus::IntermediateConfirmed => "intermediate_confirmed",
        MixingStatus::Confirmed => "confirmed",
        MixingStatus::Error => "error",
    }
}

fn coinjoin_status_key(status: CoinJoinStatus) -> &'static str {
    match status {
        CoinJoinStatus::Committed => "committed",
        CoinJoinStatus::Revealed => "revealed",
        CoinJoinStatus::Building => "building",
        CoinJoinStatus::Signed => "signed",
        CoinJoinStatus::Submitted => "submitted",
        CoinJoinStatus::Completed => "completed",
        CoinJoinStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_privacy_common::amount::Sompi;
    use kaspa_privacy_common::model::{Destination, SCHEMA_VERSION};

    fn mixing(status: MixingStatus) -> MixingSession {
        MixingSession {
            id: "m".to_string(),
            destinations: vec![Destination { address: "kaspa:dest".to_string(), amount: Sompi(1) }],
            amount: Sompi(1),
            deposit_address: "kaspa:dep".to_string(),
            deposit_private_key: "k".to_string(),
            intermediate_address: "kaspa:int".to_string(),
            intermediate_private_key: "k".to_string(),
            status,
            deposit_tx_id: None,
            intermediate_tx_id: None,
            payout_tx_ids: Vec::new(),
            intermediate_confirmed: false,
            intermediate_delay_until: None,
            created_at: 0,
            updated_at: 0,
            error: None,
            schema_version: SCHEMA_VERSION,
        }
    }

    #[test]
    fn counts_group_by_status() {
        let sessions = vec![mixing(MixingStatus::Waiting), mixing(MixingStatus::Waiting), mixing(MixingStatus::Confirmed)];
        let stats = Stats::from_sessions(&sessions, &[]);
        assert_eq!(stats.mixing.get("waiting"), Some(&2));
        assert_eq!(stats.mixing.get("confirmed"), Some(&1));
        assert!(stats.coinjoin.is_empty());
    }
}
