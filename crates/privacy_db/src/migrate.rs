//! Schema version bookkeeping for the `data` JSON documents stored in
//! `sqlite.rs`, spec.md §6 "Schema version field mandatory; unknown fields
//! preserved on read/write". Every document already carries its own
//! `schema_version`; this module is the extension point for migrating
//! documents written by an older binary forward, the way the teacher's
//! `db_common` pairs table-creation DDL with a version pragma check.
//!
//! No migration exists yet because `SCHEMA_VERSION` has not moved past its
//! initial value — `migrate` is a no-op today and is called unconditionally
//! from `SqliteSessionStore::open` so a future schema bump only has to grow
//! the match in `migrate_document`.

use crate::DbError;
use kaspa_privacy_common::model::SCHEMA_VERSION;
use rusqlite::Connection;

/// Runs after table creation, before the store is handed to callers.
/// Reserved for future `ALTER TABLE`/document-rewrite steps; does nothing
/// while every stored document is already at `SCHEMA_VERSION`.
pub fn migrate(_conn: &Connection) -> Result<(), DbError> { Ok(()) }

/// Upgrades one document's JSON value to `SCHEMA_VERSION` in place. A no-op
/// today; the match arm for the next schema bump goes here rather than in
/// `sqlite.rs`, so read paths stay a single `migrate_document` call site.
pub fn migrate_document(value: serde_json::Value) -> serde_json::Value {
    match value.get("schema_version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == SCHEMA_VERSION as u64 => value,
        _ => value,
    }
}
