//! Per-participant local signing, spec.md §4.4.5. Runs entirely inside the
//! owning session's process: the Bridge only ever sees the resulting
//! `(input_index, signature_script)` shares, never a private key.

use crate::errors::CoinJoinError;
use kaspa_privacy_common::crypto;
use kaspa_privacy_common::tx::Transaction;

/// Signs every input owned by `session_id`, refusing anything it doesn't own
/// and refusing to sign a transaction that doesn't match what the assembler
/// published (`expected_unsigned_id`).
pub fn sign_owned_inputs(
    tx: &Transaction,
    owning_session_by_input: &[String],
    session_id: &str,
    private_key_hex: &str,
    expected_unsigned_id: &str,
) -> Result<Vec<(usize, String)>, CoinJoinError> {
    if tx.unsigned_id() != expected_unsigned_id {
        return Err(CoinJoinError::SignatureRejected(
            "rebuilt transaction hash differs from the hash the assembler published".to_string(),
        ));
    }

    let owned_indices: Vec<usize> = owning_session_by_input
        .iter()
        .enumerate()
        .filter(|(_, owner)| owner.as_str() == session_id)
        .map(|(idx, _)| idx)
        .collect();
    if owned_indices.is_empty() {
        return Err(CoinJoinError::SignatureRejected(format!("session {session_id} owns no input in this transaction")));
    }

    // SIGHASH_ALL equivalent: one digest over the whole transaction, shared
    // by every input this session signs.
    let digest = crypto::sighash(expected_unsigned_id.as_bytes());
    let mut shares = Vec::with_capacity(owned_indices.len());
    for index in owned_indices {
        let signature = crypto::sign_digest(private_key_hex, &digest).map_err(CoinJoinError::SignatureRejected)?;
        shares.push((index, signature));
    }
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_privacy_common::amount::Sompi;
    use kaspa_privacy_common::model::Outpoint;
    use kaspa_privacy_common::tx::{TxInput, TxOutput};

    fn sample_tx() -> (Transaction, Vec<String>) {
        let tx = Transaction {
            inputs: vec![
                TxInput { outpoint: Outpoint::new("a".repeat(64), 0), signature_script: String::new() },
                TxInput { outpoint: Outpoint::new("b".repeat(64), 0), signature_script: String::new() },
            ],
            outputs: vec![TxOutput { script_public_key: "kaspa:dest".to_string(), amount: Sompi(1) }],
        };
        (tx, vec!["session-a".to_string(), "session-b".to_string()])
    }

    #[test]
    fn signs_only_owned_inputs() {
        let (tx, owners) = sample_tx();
        let expected_id = tx.unsigned_id();
        let kp = crypto::generate_keypair();
        let shares = sign_owned_inputs(&tx, &owners, "session-a", &kp.private_key_hex, &expected_id).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].0, 0);
    }

    #[test]
    fn refuses_foreign_input() {
        let (tx, owners) = sample_tx();
        let expected_id = tx.unsigned_id();
        let kp = crypto::generate_keypair();
        let result = sign_owned_inputs(&tx, &owners, "session-unknown", &kp.private_key_hex, &expected_id);
        assert!(result.is_err());
    }

    #[test]
    fn refuses_mismatched_published_hash() {
        let (tx, owners) = sample_tx();
        let kp = crypto::generate_keypair();
        let result = sign_owned_inputs(&tx, &owners, "session-a", &kp.private_key_hex, "not-the-real-hash");
        assert!(matches!(result, Err(CoinJoinError::SignatureRejected(_))));
    }
}
