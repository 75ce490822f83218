//! The commitment scheme from spec.md §4.4.1, pinned to SHA-256 per the
//! Open Question resolved in DESIGN.md ("the commitment hash function is
//! not labeled in one place... implementers should pin SHA-256 and version
//! the commitment scheme"). A protocol version byte is mixed into every hash
//! so a future algorithm swap is detectable rather than silently accepted.

use kaspa_privacy_common::amount::Sompi;
use kaspa_privacy_common::model::Outpoint;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const COMMITMENT_SCHEME_VERSION: u8 = 1;

pub fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn destination_hash(destination_address: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update([COMMITMENT_SCHEME_VERSION]);
    hasher.update(destination_address.as_bytes());
    hasher.update(hex::decode(salt_hex).unwrap_or_default());
    hex::encode(hasher.finalize())
}

/// Outpoints in ascending sort, per §4.4.1.
pub fn utxo_digest(utxos: &[(Outpoint, Sompi)]) -> String {
    let mut sorted: Vec<&(Outpoint, Sompi)> = utxos.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut hasher = Sha256::new();
    hasher.update([COMMITMENT_SCHEME_VERSION]);
    for (outpoint, amount) in sorted {
        hasher.update(outpoint.transaction_id.as_bytes());
        hasher.update(outpoint.output_index.to_be_bytes());
        hasher.update(amount.0.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn commitment(dest_hash: &str, utxo_digest: &str, per_participant_amount: Sompi) -> String {
    let mut hasher = Sha256::new();
    hasher.update([COMMITMENT_SCHEME_VERSION]);
    hasher.update(dest_hash.as_bytes());
    hasher.update(utxo_digest.as_bytes());
    hasher.update(per_participant_amount.0.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_inputs_produce_distinct_commitments() {
        let salt_a = generate_salt();
        let salt_b = generate_salt();
        let dest_hash_a = destination_hash("kaspa:addr-a", &salt_a);
        let dest_hash_b = destination_hash("kaspa:addr-b", &salt_b);
        assert_ne!(dest_hash_a, dest_hash_b);

        let utxos_a = vec![(Outpoint::new("aa".repeat(32), 0), Sompi(100_000_000))];
        let utxos_b = vec![(Outpoint::new("bb".repeat(32), 1), Sompi(100_000_000))];
        let commitment_a = commitment(&dest_hash_a, &utxo_digest(&utxos_a), Sompi(100_000_000));
        let commitment_b = commitment(&dest_hash_b, &utxo_digest(&utxos_b), Sompi(100_000_000));
        assert_ne!(commitment_a, commitment_b);
    }

    #[test]
    fn utxo_digest_is_order_independent() {
        let op1 = Outpoint::new("aa".repeat(32), 0);
        let op2 = Outpoint::new("bb".repeat(32), 0);
        let forward = utxo_digest(&[(op1.clone(), Sompi(1)), (op2.clone(), Sompi(2))]);
        let backward = utxo_digest(&[(op2, Sompi(2)), (op1, Sompi(1))]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn reveal_recomputation_matches_commitment() {
        let salt = generate_salt();
        let dest = "kaspa:addr-recompute";
        let utxos = vec![(Outpoint::new("cc".repeat(32), 2), Sompi(250_000_000))];
        let dest_hash = destination_hash(dest, &salt);
        let digest = utxo_digest(&utxos);
        let published = commitment(&dest_hash, &digest, Sompi(250_000_000));

        // What a peer recomputes upon reveal.
        let recomputed_dest_hash = destination_hash(dest, &salt);
        let recomputed = commitment(&recomputed_dest_hash, &utxo_digest(&utxos), Sompi(250_000_000));
        assert_eq!(published, recomputed);
    }
}
