//! Builds the unsigned CoinJoin transaction from a completed round of
//! reveals, spec.md §4.4.4. Pure function over already-verified reveals —
//! the caller (the engine's `build` operation) is responsible for having
//! checked each reveal against its commitment first.

use crate::errors::CoinJoinError;
use kaspa_privacy_common::amount::Sompi;
use kaspa_privacy_common::model::UtxoEntry;
use kaspa_privacy_common::tx::{Transaction, TxInput, TxOutput};
use serde::{Deserialize, Serialize};

/// One participant's published reveal, matched to its session id.
#[derive(Debug, Clone)]
pub struct RevealedParticipant {
    pub session_id: String,
    pub destination_address: String,
    pub utxos: Vec<UtxoEntry>,
}

/// Mass estimate constants tuned so a 10-participant round lands near the
/// ≈16k mass the spec's reference parameters produce (§4.4.4).
const INPUT_MASS: u64 = 1_300;
const OUTPUT_MASS: u64 = 300;
const OVERHEAD_MASS: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledTransaction {
    pub tx: Transaction,
    /// Parallel to `tx.inputs`: the session id that owns each input.
    pub owning_session_by_input: Vec<String>,
    pub fee: Sompi,
    pub per_output: Sompi,
    pub mass: u64,
}

pub fn assemble(
    revealed: &[RevealedParticipant],
    participant_count: usize,
    normal_fee_rate: u64,
    mass_limit: u64,
) -> Result<AssembledTransaction, CoinJoinError> {
    if revealed.len() != participant_count {
        return Err(CoinJoinError::IncompleteRound { expected: participant_count, actual: revealed.len() });
    }

    let mut contributions: Vec<(String, Sompi)> = Vec::with_capacity(revealed.len());
    for participant in revealed {
        let total: Sompi = participant.utxos.iter().map(|u| u.amount).sum();
        contributions.push((participant.session_id.clone(), total));
    }
    let max = contributions.iter().map(|(_, a)| a.0).max().unwrap_or(0);
    let min = contributions.iter().map(|(_, a)| a.0).min().unwrap_or(0);
    if max != min {
        return Err(CoinJoinError::UnequalContribution);
    }

    // Canonical input order: lexicographic by (tx_id, index), so every
    // participant signs the same pre-image.
    let mut indexed_inputs: Vec<(String, UtxoEntry)> = revealed
        .iter()
        .flat_map(|p| p.utxos.iter().map(move |u| (p.session_id.clone(), u.clone())))
        .collect();
    indexed_inputs.sort_by(|a, b| a.1.outpoint.cmp(&b.1.outpoint));

    let owning_session_by_input: Vec<String> = indexed_inputs.iter().map(|(s, _)| s.clone()).collect();
    let inputs: Vec<TxInput> = indexed_inputs
        .iter()
        .map(|(_, u)| TxInput { outpoint: u.outpoint.clone(), signature_script: String::new() })
        .collect();
    let total_input: Sompi = indexed_inputs.iter().map(|(_, u)| u.amount).sum();

    let mass = INPUT_MASS.saturating_mul(inputs.len() as u64)
        + OUTPUT_MASS.saturating_mul(participant_count as u64)
        + OVERHEAD_MASS;
    if mass >= mass_limit {
        return Err(CoinJoinError::MassExceeded { mass, limit: mass_limit });
    }
    let estimated_fee = Sompi(normal_fee_rate.saturating_mul(mass));

    let total_after_fee = total_input.checked_sub(estimated_fee).unwrap_or(Sompi::ZERO);
    let per_output = Sompi(total_after_fee.0 / participant_count as u64);
    let remainder = Sompi(total_after_fee.0 % participant_count as u64);
    // Any remainder from the integer division is folded into the fee, never
    // into an output — outputs are never unequal (§4.4.4).
    let fee = estimated_fee.checked_add(remainder).unwrap_or(estimated_fee);

    // Output order: destination address bytes, ties broken by the position
    // of that session's first input in the canonical input order.
    let mut first_input_position: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for (idx, session_id) in owning_session_by_input.iter().enumerate() {
        first_input_position.entry(session_id.as_str()).or_insert(idx);
    }
    let mut ordered_destinations: Vec<&RevealedParticipant> = revealed.iter().collect();
    ordered_destinations.sort_by(|a, b| {
        a.destination_address
            .as_bytes()
            .cmp(b.destination_address.as_bytes())
            .then_with(|| first_input_position[a.session_id.as_str()].cmp(&first_input_position[b.session_id.as_str()]))
    });
    let outputs: Vec<TxOutput> = ordered_destinations
        .iter()
        .map(|p| TxOutput { script_public_key: p.destination_address.clone(), amount: per_output })
        .collect();

    Ok(AssembledTransaction {
        tx: Transaction { inputs, outputs },
        owning_session_by_input,
        fee,
        per_output,
        mass,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_privacy_common::model::Outpoint;

    fn participant(id: &str, addr: &str, tx_id: &str, amount: u64) -> RevealedParticipant {
        RevealedParticipant {
            session_id: id.to_string(),
            destination_address: addr.to_string(),
            utxos: vec![UtxoEntry {
                outpoint: Outpoint::new(tx_id.repeat(32), 0),
                amount: Sompi(amount),
                script_public_key: "source".to_string(),
                block_daa_score: 0,
                is_coinbase: false,
            }],
        }
    }

    #[test]
    fn ten_equal_participants_assemble_with_equal_outputs() {
        let revealed: Vec<RevealedParticipant> = (0..10)
            .map(|i| participant(&format!("s{i}"), &format!("kaspa:dest{i}"), &format!("{i}"), 100_000_000))
            .collect();
        let assembled = assemble(&revealed, 10, 2, 100_000).unwrap();
        assert_eq!(assembled.tx.inputs.len(), 10);
        assert_eq!(assembled.tx.outputs.len(), 10);
        let first = assembled.tx.outputs[0].amount;
        assert!(assembled.tx.outputs.iter().all(|o| o.amount == first));
        let total_out: Sompi = assembled.tx.outputs.iter().map(|o| o.amount).sum();
        let total_in: Sompi = Sompi(1_000_000_000);
        assert_eq!(total_in.checked_sub(total_out).unwrap(), assembled.fee);
    }

    #[test]
    fn unequal_contribution_is_rejected() {
        let mut revealed: Vec<RevealedParticipant> = (0..9)
            .map(|i| participant(&format!("s{i}"), &format!("kaspa:dest{i}"), &format!("{i}"), 100_000_000))
            .collect();
        revealed.push(participant("s9", "kaspa:dest9", "9", 99_999_999));
        let result = assemble(&revealed, 10, 2, 100_000);
        assert!(matches!(result, Err(CoinJoinError::UnequalContribution)));
    }

    #[test]
    fn incomplete_round_is_rejected() {
        let revealed: Vec<RevealedParticipant> = (0..9)
            .map(|i| participant(&format!("s{i}"), &format!("kaspa:dest{i}"), &format!("{i}"), 100_000_000))
            .collect();
        let result = assemble(&revealed, 10, 2, 100_000);
        assert!(matches!(result, Err(CoinJoinError::IncompleteRound { expected: 10, actual: 9 })));
    }
}
