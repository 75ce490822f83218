use crate::{DbError, SessionStore};
use async_trait::async_trait;
use kaspa_privacy_common::model::{CoinJoinSession, MixingSession, Outpoint};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub type SqliteConnShared = Arc<Mutex<Connection>>;

const CREATE_TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS mixing_sessions (
    id TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL,
    status TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS coinjoin_sessions (
    id TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL,
    status TEXT NOT NULL,
    per_participant_amount INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS coinjoin_outpoints (
    tx_id TEXT NOT NULL,
    output_index INTEGER NOT NULL,
    session_id TEXT NOT NULL,
    PRIMARY KEY (tx_id, output_index)
);
";

/// The single-writer session store. Every write is one SQL transaction
/// (atomic per spec.md §6), and `Connection` is wrapped the way the
/// teacher's `db_common::sqlite::SqliteConnShared` wraps it — an
/// `Arc<Mutex<Connection>>` rather than a pool, since this crate has exactly
/// one writer task by design (spec.md §5 "single-writer, cooperative").
pub struct SqliteSessionStore {
    conn: SqliteConnShared,
}

impl SqliteSessionStore {
    pub fn open(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        crate::migrate::migrate(&conn)?;
        Ok(SqliteSessionStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        crate::migrate::migrate(&conn)?;
        Ok(SqliteSessionStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::PoolPoisoned)
    }

    fn sync_coinjoin_outpoints(conn: &Connection, session: &CoinJoinSession) -> Result<(), DbError> {
        conn.execute("DELETE FROM coinjoin_outpoints WHERE session_id = ?1", params![session.id])?;
        let mut seen: HashSet<&Outpoint> = HashSet::new();
        let mut insert_all = |outpoints: &[Outpoint]| -> Result<(), DbError> {
            for outpoint in outpoints {
                if seen.insert(outpoint) {
                    conn.execute(
                        "INSERT OR IGNORE INTO coinjoin_outpoints (tx_id, output_index, session_id) VALUES (?1, ?2, ?3)",
                        params![outpoint.transaction_id, outpoint.output_index, session.id],
                    )?;
                }
            }
            Ok(())
        };
        if let Some(original) = &session.original_utxos {
            let outpoints: Vec<Outpoint> = original.iter().map(|u| u.outpoint.clone()).collect();
            insert_all(&outpoints)?;
        }
        if let Some(revealed) = &session.revealed_utxos {
            let outpoints: Vec<Outpoint> = revealed.iter().map(|u| u.outpoint.clone()).collect();
            insert_all(&outpoints)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn upsert_mixing(&self, session: &MixingSession) -> Result<(), DbError> {
        let conn = self.lock()?;
        let data = serde_json::to_string(session)?;
        let status = serde_json::to_value(session.status)?.as_str().unwrap_or_default().to_string();
        conn.execute(
            "INSERT INTO mixing_sessions (id, data, status, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, status = excluded.status, updated_at = excluded.updated_at",
            params![session.id, data, status, session.updated_at as i64],
        )?;
        Ok(())
    }

    async fn get_mixing(&self, id: &str) -> Result<Option<MixingSession>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM mixing_sessions WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            },
            None => Ok(None),
        }
    }

    async fn list_mixing(&self) -> Result<Vec<MixingSession>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM mixing_sessions ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    async fn delete_mixing(&self, id: &str) -> Result<(), DbError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM mixing_sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn upsert_coinjoin(&self, session: &CoinJoinSession) -> Result<(), DbError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let data = serde_json::to_string(session)?;
        let status = serde_json::to_value(session.status)?.as_str().unwrap_or_default().to_string();
        tx.execute(
            "INSERT INTO coinjoin_sessions (id, data, status, per_participant_amount, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, status = excluded.status,
                per_participant_amount = excluded.per_participant_amount, updated_at = excluded.updated_at",
            params![
                session.id,
                data,
                status,
                session.per_participant_amount.0 as i64,
                session.updated_at as i64
            ],
        )?;
        Self::sync_coinjoin_outpoints(&tx, session)?;
        tx.commit()?;
        Ok(())
    }

    async fn get_coinjoin(&self, id: &str) -> Result<Option<CoinJoinSession>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM coinjoin_sessions WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            },
            None => Ok(None),
        }
    }

    async fn list_coinjoin(&self) -> Result<Vec<CoinJoinSession>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM coinjoin_sessions ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    async fn delete_coinjoin(&self, id: &str) -> Result<(), DbError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM coinjoin_sessions WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM coinjoin_outpoints WHERE session_id = ?1", params![id])?;
        Ok(())
    }

    async fn excluded_coinjoin_outpoints(&self) -> Result<HashSet<Outpoint>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT o.tx_id, o.output_index FROM coinjoin_outpoints o
             JOIN coinjoin_sessions s ON o.session_id = s.id
             WHERE s.status != 'failed'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Outpoint::new(row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
        })?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }
}
