//! The networked relay between CoinJoin participants, spec.md §4.5. Round
//! formation, message fan-out, and phase-ordering enforcement live here; the
//! commitment math and per-session state machine each participant's own
//! process runs belong to `coinjoin_engine`, whose `verify_reveal` and
//! `no_duplicate_outpoints` this crate reuses when validating a `REVEAL`
//! before forwarding it.

pub mod client;
pub mod errors;
pub mod message;
pub mod round;
pub mod server;

pub use client::run_round;
pub use errors::BridgeError;
pub use message::{BridgeMessage, MessagePhase};
pub use round::{RoundRegistry, RoundState};
pub use server::BridgeServer;
