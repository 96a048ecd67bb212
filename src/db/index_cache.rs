// src/db/index_cache.rs

//! Deduplication cache of already-seen event ids, keyed by source type.
//!
//! Queries reflect all prior updates from the caller's perspective; a
//! shared connection behind a mutex is enough for the per-tick volumes
//! sources produce.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params};

pub struct IndexCache {
    conn: Arc<Mutex<Connection>>,
    source_type: String,
}

impl IndexCache {
    pub fn new(conn: Arc<Mutex<Connection>>, source_type: impl Into<String>) -> Self {
        Self { conn, source_type: source_type.into() }
    }

    /// Every event id previously recorded for this source type.
    pub fn query_index_cache(&self) -> rusqlite::Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT event_id FROM seen_events WHERE source_type = ?1")?;
        let rows = stmt.query_map([&self.source_type], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// Persist newly-seen ids.  Re-inserting a known id is a no-op.
    pub fn update_index_cache(&self, ids: &[String]) -> rusqlite::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO seen_events (source_type, event_id, first_seen) \
                 VALUES (?1, ?2, ?3)",
            )?;
            let now = chrono::Utc::now().timestamp();
            for id in ids {
                stmt.execute(params![self.source_type, id, now])?;
            }
        }
        tx.commit()
    }
}
