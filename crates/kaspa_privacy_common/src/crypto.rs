//! Minimal keypair and signing plumbing for the two ephemeral addresses a
//! mixing session owns, and for CoinJoin per-input signing. Real wallet key
//! derivation, import, and the address book are out of scope (spec.md §1
//! "external collaborators, specified only at their boundaries") — this is
//! only enough to let the engines generate throwaway keys and sign their own
//! transactions, grounded on the teacher's use of `secp256k1` for UTXO-coin
//! signing (`mm2_bitcoin/keys`).

use rand::RngCore;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key_hex: String,
    pub public_key_hex: String,
    pub address: String,
}

/// Generates a fresh secp256k1 keypair and a simplified address string.
/// Real Kaspa addresses are bech32-encoded over a schnorr pubkey; deriving
/// that is wallet territory (out of scope), so the address here is a plain
/// `kaspa:<pubkey-hex-prefix>` the engines treat as an opaque identifier.
pub fn generate_keypair() -> KeyPair {
    let secp = Secp256k1::new();
    let mut rng_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut rng_bytes);
    let secret_key = SecretKey::from_slice(&rng_bytes).expect("32 random bytes are a valid secret key");
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    let address = format!("kaspa:{}", &hex::encode(public_key.serialize())[..40]);
    KeyPair {
        private_key_hex: hex::encode(secret_key.secret_bytes()),
        public_key_hex: hex::encode(public_key.serialize()),
        address,
    }
}

pub fn address_for_public_key(public_key_hex: &str) -> Result<String, String> {
    let bytes = hex::decode(public_key_hex).map_err(|e| e.to_string())?;
    Ok(format!("kaspa:{}", &hex::encode(bytes)[..40.min(hex::encode(&bytes).len())]))
}

/// Canonical sighash used throughout, the SIGHASH_ALL equivalent required by
/// spec.md §4.4.5: a single digest over the whole transaction, not per-input.
pub fn sighash(preimage: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(preimage);
    hasher.finalize().into()
}

/// Signs `digest` with `private_key_hex`, returning a hex-encoded DER
/// signature. Used for both the Mixer Engine's sweep/payout transactions and
/// the CoinJoin per-input signer.
pub fn sign_digest(private_key_hex: &str, digest: &[u8; 32]) -> Result<String, String> {
    let secp = Secp256k1::new();
    let bytes = hex::decode(private_key_hex).map_err(|e| e.to_string())?;
    let secret_key = SecretKey::from_slice(&bytes).map_err(|e| e.to_string())?;
    let message = Message::from_slice(digest).map_err(|e| e.to_string())?;
    let signature = secp.sign(&message, &secret_key);
    Ok(hex::encode(signature.serialize_der()))
}

/// Verifies `signature_hex` over `digest` against the holder of
/// `private_key_hex` (used in tests and by the signer's self-checks — the
/// CoinJoin aggregator verifies against the public key published at reveal
/// time instead, since it never sees a private key).
pub fn verify_with_public_key(public_key_hex: &str, digest: &[u8; 32], signature_hex: &str) -> bool {
    let secp = Secp256k1::new();
    let pk_bytes = match hex::decode(public_key_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let public_key = match PublicKey::from_slice(&pk_bytes) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig_bytes = match hex::decode(signature_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let signature = match secp256k1::Signature::from_der(&sig_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let message = match Message::from_slice(digest) {
        Ok(m) => m,
        Err(_) => return false,
    };
    secp.verify(&message, &signature, &public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = generate_keypair();
        let digest = sighash(b"some transaction preimage");
        let sig = sign_digest(&kp.private_key_hex, &digest).unwrap();
        assert!(verify_with_public_key(&kp.public_key_hex, &digest, &sig));
    }

    #[test]
    fn rejects_wrong_digest() {
        let kp = generate_keypair();
        let digest = sighash(b"preimage a");
        let sig = sign_digest(&kp.private_key_hex, &digest).unwrap();
        let other_digest = sighash(b"preimage b");
        assert!(!verify_with_public_key(&kp.public_key_hex, &other_digest, &sig));
    }
}
