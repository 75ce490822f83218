//! Round formation and phase ordering, spec.md §4.5/§4.4.2. The registry
//! groups `JOIN`s by `per_participant_amount`; once a group reaches the
//! fixed participant count a round is cut and any excess commitments start
//! the next one. Each round then enforces the reveal-before-sign-before-
//! submit ordering rule locally.

use crate::errors::BridgeError;
use crate::message::{BridgeMessage, MessagePhase};
use coinjoin_engine::RevealedParticipant;
use kaspa_privacy_common::amount::Sompi;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct JoinRecord {
    session_id: String,
    commitment: String,
    destination_hash: String,
}

/// A round's local bookkeeping. The Bridge never inspects `salt`,
/// `destination_address`, or private keys — only what participants choose to
/// publish at each phase.
pub struct RoundState {
    pub round_id: String,
    pub per_participant_amount: Sompi,
    pub commitments: HashMap<String, (String, String)>,
    pub phase: MessagePhase,
    pub revealed: HashMap<String, RevealedParticipant>,
    pub sig_shares: HashMap<usize, (String, String)>,
    pub last_advance_ms: u64,
}

impl RoundState {
    fn new(round_id: String, per_participant_amount: Sompi, commitments: Vec<JoinRecord>, now_ms: u64) -> Self {
        RoundState {
            round_id,
            per_participant_amount,
            commitments: commitments
                .into_iter()
                .map(|r| (r.session_id, (r.commitment, r.destination_hash)))
                .collect(),
            phase: MessagePhase::Join,
            revealed: HashMap::new(),
            sig_shares: HashMap::new(),
            last_advance_ms: now_ms,
        }
    }

    /// Enforces spec.md §4.5 ordering: reveals precede signatures, which
    /// precede submission. `Abort` is always accepted.
    pub fn accept(&mut self, message: &BridgeMessage, now_ms: u64) -> Result<(), BridgeError> {
        let incoming_phase = message.phase();
        if incoming_phase == MessagePhase::Abort {
            self.last_advance_ms = now_ms;
            return Ok(());
        }
        if incoming_phase < self.phase {
            return Err(BridgeError::OutOfOrder { round_id: self.round_id.clone(), phase: format!("{incoming_phase:?}") });
        }

        match message {
            BridgeMessage::Reveal { session_id, destination_address, salt, utxos } => {
                let (commitment, _destination_hash) = self
                    .commitments
                    .get(session_id)
                    .ok_or_else(|| BridgeError::UnknownSession(session_id.clone()))?
                    .clone();

                if let Err(e) =
                    coinjoin_engine::verify_reveal(&commitment, destination_address, salt, utxos, self.per_participant_amount)
                {
                    return Err(self.reject_reveal(session_id, e));
                }

                let candidate = RevealedParticipant {
                    session_id: session_id.clone(),
                    destination_address: destination_address.clone(),
                    utxos: utxos.clone(),
                };
                let mut all_revealed: Vec<RevealedParticipant> = self.revealed.values().cloned().collect();
                all_revealed.push(candidate.clone());
                if let Err(e) = coinjoin_engine::no_duplicate_outpoints(&all_revealed) {
                    return Err(self.reject_reveal(session_id, e));
                }

                self.revealed.insert(session_id.clone(), candidate);
                self.phase = MessagePhase::Reveal;
            },
            BridgeMessage::SigShare { owning_session, input_indices, signatures, .. } => {
                if self.phase < MessagePhase::Reveal || self.revealed.len() < self.commitments.len() {
                    return Err(BridgeError::OutOfOrder {
                        round_id: self.round_id.clone(),
                        phase: "SIG_SHARE before every participant revealed".to_string(),
                    });
                }
                for (index, signature) in input_indices.iter().zip(signatures.iter()) {
                    if let Some((existing_session, existing_sig)) = self.sig_shares.get(index) {
                        if existing_session != owning_session {
                            return Err(BridgeError::ForeignSignature { input_index: *index });
                        }
                        if existing_sig != signature {
                            return Err(BridgeError::DuplicateSignature { input_index: *index });
                        }
                    } else {
                        self.sig_shares.insert(*index, (owning_session.clone(), signature.clone()));
                    }
                }
                self.phase = MessagePhase::Sign;
            },
            BridgeMessage::Submitted { .. } => {
                if self.phase < MessagePhase::Sign {
                    return Err(BridgeError::OutOfOrder {
                        round_id: self.round_id.clone(),
                        phase: "SUBMITTED before any signature".to_string(),
                    });
                }
                self.phase = MessagePhase::Submit;
            },
            BridgeMessage::Join { .. } | BridgeMessage::Abort { .. } => unreachable!("handled above"),
        }
        self.last_advance_ms = now_ms;
        Ok(())
    }

    pub fn is_idle(&self, now_ms: u64, idle_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_advance_ms) >= idle_timeout_ms
    }

    /// Drops a session whose reveal failed peer verification (spec.md
    /// §4.4.3: "any failure causes that session to transition to failed and
    /// be removed from the round"). The round keeps running for whoever is
    /// left; `build` will simply never reach `participant_count` for it.
    fn reject_reveal(&mut self, session_id: &str, source: coinjoin_engine::CoinJoinError) -> BridgeError {
        self.commitments.remove(session_id);
        self.revealed.remove(session_id);
        BridgeError::RevealRejected { session_id: session_id.to_string(), source }
    }
}

/// Groups pending `JOIN`s by amount and cuts a round once `participant_count`
/// distinct commitments have accrued for that amount (spec.md §4.4.2).
pub struct RoundRegistry {
    participant_count: usize,
    pending: HashMap<u64, Vec<JoinRecord>>,
    rounds: HashMap<String, RoundState>,
}

impl RoundRegistry {
    pub fn new(participant_count: usize) -> Self {
        RoundRegistry { participant_count, pending: HashMap::new(), rounds: HashMap::new() }
    }

    /// Returns the newly formed round's id once its lobby reaches
    /// `participant_count`; excess joins remain pending for the next round.
    pub fn join(
        &mut self,
        amount: Sompi,
        session_id: String,
        commitment: String,
        destination_hash: String,
        now_ms: u64,
    ) -> Option<String> {
        let lobby = self.pending.entry(amount.0).or_default();
        lobby.push(JoinRecord { session_id, commitment, destination_hash });
        if lobby.len() < self.participant_count {
            return None;
        }
        let cut: Vec<JoinRecord> = lobby.drain(..self.participant_count).collect();
        let round_id = Uuid::new_v4().to_string();
        self.rounds.insert(round_id.clone(), RoundState::new(round_id.clone(), amount, cut, now_ms));
        Some(round_id)
    }

    pub fn round_mut(&mut self, round_id: &str) -> Option<&mut RoundState> {
        self.rounds.get_mut(round_id)
    }

    pub fn round(&self, round_id: &str) -> Option<&RoundState> {
        self.rounds.get(round_id)
    }

    pub fn remove(&mut self, round_id: &str) -> Option<RoundState> {
        self.rounds.remove(round_id)
    }

    /// Rounds idle past `idle_timeout_ms`, to be aborted with `RoundTimeout`
    /// (spec.md §4.5 "Rounds expire after a configurable idle timeout").
    pub fn idle_round_ids(&self, now_ms: u64, idle_timeout_ms: u64) -> Vec<String> {
        self.rounds
            .values()
            .filter(|r| r.is_idle(now_ms, idle_timeout_ms))
            .map(|r| r.round_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_privacy_common::model::{Outpoint, UtxoEntry};

    fn real_commitment(destination_address: &str, salt: &str, utxos: &[UtxoEntry], amount: Sompi) -> String {
        let dest_hash = coinjoin_engine::commitment::destination_hash(destination_address, salt);
        let pairs: Vec<_> = utxos.iter().map(|u| (u.outpoint.clone(), u.amount)).collect();
        let digest = coinjoin_engine::commitment::utxo_digest(&pairs);
        coinjoin_engine::commitment::commitment(&dest_hash, &digest, amount)
    }

    fn utxo(tx_id: &str, amount: u64) -> UtxoEntry {
        UtxoEntry {
            outpoint: Outpoint { transaction_id: tx_id.to_string(), output_index: 0 },
            amount: Sompi(amount),
            script_public_key: "spk".to_string(),
            block_daa_score: 0,
            is_coinbase: false,
        }
    }

    #[test]
    fn round_cuts_at_exactly_participant_count() {
        let mut registry = RoundRegistry::new(10);
        let mut round_id = None;
        for i in 0..12 {
            let formed = registry.join(Sompi(100_000_000), format!("s{i}"), format!("c{i}"), format!("d{i}"), 0);
            if formed.is_some() {
                round_id = formed;
            }
        }
        let round_id = round_id.expect("round forms at the 10th join");
        let round = registry.round(&round_id).unwrap();
        assert_eq!(round.commitments.len(), 10);
        // Two joins beyond the 10th start a fresh lobby entry, not a second round.
        assert_eq!(registry.pending.get(&100_000_000u64).map(Vec::len), Some(2));
    }

    #[test]
    fn rejects_signature_before_every_reveal() {
        let utxos_a = vec![utxo("tx-a", 1)];
        let commitment_a = real_commitment("kaspa:a", "s", &utxos_a, Sompi(1));
        let mut registry = RoundRegistry::new(2);
        let round_id = registry.join(Sompi(1), "a".to_string(), commitment_a, "da".to_string(), 0);
        assert!(round_id.is_none());
        let round_id = registry.join(Sompi(1), "b".to_string(), "cb".to_string(), "db".to_string(), 0).unwrap();

        let round = registry.round_mut(&round_id).unwrap();
        let sig_message = BridgeMessage::SigShare {
            round_id: round_id.clone(),
            owning_session: "a".to_string(),
            input_indices: vec![0],
            signatures: vec!["sig".to_string()],
        };
        assert!(round.accept(&sig_message, 0).is_err());

        let reveal_a = BridgeMessage::Reveal {
            round_id: round_id.clone(),
            session_id: "a".to_string(),
            destination_address: "kaspa:a".to_string(),
            salt: "s".to_string(),
            utxos: utxos_a,
        };
        round.accept(&reveal_a, 1).unwrap();
        // Still missing session "b"'s reveal.
        assert!(round.accept(&sig_message, 2).is_err());
    }

    #[test]
    fn rejects_a_reveal_that_does_not_match_its_commitment() {
        let mut registry = RoundRegistry::new(2);
        // "ca" was never computed from any real (destination, salt, utxos) tuple.
        let round_id = registry.join(Sompi(1), "a".to_string(), "ca".to_string(), "da".to_string(), 0);
        assert!(round_id.is_none());
        let round_id = registry.join(Sompi(1), "b".to_string(), "cb".to_string(), "db".to_string(), 0).unwrap();
        let round = registry.round_mut(&round_id).unwrap();

        let bogus_reveal = BridgeMessage::Reveal {
            round_id: round_id.clone(),
            session_id: "a".to_string(),
            destination_address: "kaspa:not-what-was-committed".to_string(),
            salt: "s".to_string(),
            utxos: vec![utxo("tx-a", 1)],
        };
        let err = round.accept(&bogus_reveal, 1).unwrap_err();
        assert!(matches!(err, BridgeError::RevealRejected { .. }));
        // The offending session is dropped from the round entirely.
        assert!(!round.commitments.contains_key("a"));
    }

    #[test]
    fn rejects_a_reveal_whose_outpoint_is_already_revealed_by_another_session() {
        let shared_utxo = utxo("tx-shared", 1);
        let commitment_a = real_commitment("kaspa:a", "sa", std::slice::from_ref(&shared_utxo), Sompi(1));
        let commitment_b = real_commitment("kaspa:b", "sb", std::slice::from_ref(&shared_utxo), Sompi(1));

        let mut registry = RoundRegistry::new(2);
        let round_id = registry.join(Sompi(1), "a".to_string(), commitment_a, "da".to_string(), 0);
        assert!(round_id.is_none());
        let round_id = registry.join(Sompi(1), "b".to_string(), commitment_b, "db".to_string(), 0).unwrap();
        let round = registry.round_mut(&round_id).unwrap();

        let reveal_a = BridgeMessage::Reveal {
            round_id: round_id.clone(),
            session_id: "a".to_string(),
            destination_address: "kaspa:a".to_string(),
            salt: "sa".to_string(),
            utxos: vec![shared_utxo.clone()],
        };
        round.accept(&reveal_a, 1).unwrap();

        let reveal_b = BridgeMessage::Reveal {
            round_id: round_id.clone(),
            session_id: "b".to_string(),
            destination_address: "kaspa:b".to_string(),
            salt: "sb".to_string(),
            utxos: vec![shared_utxo],
        };
        let err = round.accept(&reveal_b, 2).unwrap_err();
        assert!(matches!(err, BridgeError::RevealRejected { .. }));
        assert!(!round.commitments.contains_key("b"));
        // "a"'s reveal still stands.
        assert!(round.revealed.contains_key("a"));
    }

    #[test]
    fn detects_idle_round() {
        let mut registry = RoundRegistry::new(1);
        let round_id = registry.join(Sompi(1), "a".to_string(), "ca".to_string(), "da".to_string(), 0).unwrap();
        assert!(registry.idle_round_ids(600_001, 600_000).contains(&round_id));
        assert!(registry.idle_round_ids(599_999, 600_000).is_empty());
    }
}
