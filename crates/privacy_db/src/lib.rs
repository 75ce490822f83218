//! Single-writer append/update store keyed by session id (spec.md §2/§6).
//! Adapted from the teacher's `db_common::sqlite` + `mm2_core::sql_connection_pool`:
//! one `rusqlite::Connection` behind a lock, sessions stored as a JSON
//! document per row so unknown fields round-trip untouched (spec.md §6
//! "unknown fields preserved on read/write").

pub mod errors;
pub mod migrate;
pub mod sqlite;

pub use errors::DbError;

use async_trait::async_trait;
use kaspa_privacy_common::model::{CoinJoinSession, MixingSession, Outpoint};
use std::collections::HashSet;

/// Persistence contract. A single implementor (`sqlite::SqliteSessionStore`)
/// ships in this crate; the trait exists so engines can be tested against an
/// in-memory fake without a filesystem.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert_mixing(&self, session: &MixingSession) -> Result<(), DbError>;
    async fn get_mixing(&self, id: &str) -> Result<Option<MixingSession>, DbError>;
    async fn list_mixing(&self) -> Result<Vec<MixingSession>, DbError>;
    async fn delete_mixing(&self, id: &str) -> Result<(), DbError>;

    async fn upsert_coinjoin(&self, session: &CoinJoinSession) -> Result<(), DbError>;
    async fn get_coinjoin(&self, id: &str) -> Result<Option<CoinJoinSession>, DbError>;
    async fn list_coinjoin(&self) -> Result<Vec<CoinJoinSession>, DbError>;
    async fn delete_coinjoin(&self, id: &str) -> Result<(), DbError>;

    /// Every outpoint referenced by a CoinJoin session that is not `failed`
    /// — including `completed` ones — the exclude set from spec.md §4.3 step 1
    /// and the §3 invariant "at most one non-failed, non-completed session".
    async fn excluded_coinjoin_outpoints(&self) -> Result<HashSet<Outpoint>, DbError>;
}
