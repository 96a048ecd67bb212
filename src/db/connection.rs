// src/db/connection.rs
//! Opening and initialising SQLite with runtime parameters.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::types::DatabaseConfig;

pub fn open_db_connection(path: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(1_000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", cfg.synchronous.as_str())?;
    Ok(conn)
}

/// Open the database and apply the schema if it is the first run.
pub fn init_database(cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    if cfg.purge_on_restart && cfg.path.exists() {
        let _ = fs::remove_file(&cfg.path);
    }
    let first_run = !cfg.path.exists();

    let conn = open_db_connection(&cfg.path, cfg)?;
    if first_run {
        let schema = include_str!("../../resources/schema.sql");
        conn.execute_batch(schema)?;
    }
    log::info!("database ready at {}", cfg.path.display());
    Ok(conn)
}
