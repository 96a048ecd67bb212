// src/db/writer.rs

//! Batched SQLite writer draining the match queue.
//!
//! All DB work happens synchronously to avoid holding `&Connection` across
//! an `.await`; the async part is only the select between "next match" and
//! "flush tick".

use std::thread::sleep;
use std::time::Duration;
use std::sync::Arc;

use rusqlite::{Connection, Statement, params};
use thiserror::Error;

use crate::events::Match;
use crate::pipeline::AckQueue;

/// Defines how to insert one record of a batch.
pub trait BatchInsert<T> {
    fn insert_sql() -> &'static str;
    fn bind_and_execute(stmt: &mut Statement<'_>, record: &T) -> rusqlite::Result<()>;
}

impl BatchInsert<Match> for Match {
    fn insert_sql() -> &'static str {
        "INSERT INTO matches \
           (ts, event_id, source_type, namespace, rule, tags, regions) \
         VALUES (?1,?2,?3,?4,?5,?6,?7)"
    }

    fn bind_and_execute(stmt: &mut Statement<'_>, rec: &Match) -> rusqlite::Result<()> {
        let regions = serde_json::to_string(&rec.regions)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        stmt.execute(params![
            rec.ts.timestamp_micros(),
            rec.event_id,
            rec.source_type,
            rec.namespace,
            rec.rule_name,
            rec.tags.join(","),
            regions,
        ])?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Drains the match queue into SQLite in batched transactions.
pub struct MatchWriter {
    pub conn: Connection,
    pub queue: Arc<AckQueue<Match>>,
    pub flush_interval_ms: u64,
    pub batch_size: usize,
}

impl MatchWriter {
    /// Start the writer loop; call inside `tokio::spawn`.  Exits after the
    /// queue is closed and the last buffered matches are flushed.
    pub async fn run(mut self) {
        let mut buffer: Vec<Match> = Vec::with_capacity(self.batch_size);
        let mut interval = tokio::time::interval(Duration::from_millis(self.flush_interval_ms));

        loop {
            tokio::select! {
                m = self.queue.dequeue() => {
                    self.queue.acknowledge();
                    buffer.push(m);
                    if buffer.len() >= self.batch_size {
                        if let Err(e) = self.flush_sync(&mut buffer) {
                            log::error!("match flush failed: {}", e);
                        }
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.flush_sync(&mut buffer) {
                        log::error!("match flush failed: {}", e);
                    }
                    if self.queue.is_closed() {
                        while let Some(m) = self.queue.try_dequeue() {
                            self.queue.acknowledge();
                            buffer.push(m);
                        }
                        if let Err(e) = self.flush_sync(&mut buffer) {
                            log::error!("final match flush failed: {}", e);
                        }
                        break;
                    }
                }
            }
        }
        log::info!("match writer stopped");
    }

    /// Synchronous flush with retry + backoff on a locked database.
    fn flush_sync(&mut self, buffer: &mut Vec<Match>) -> Result<(), DbError> {
        let mut attempts = 0;

        while !buffer.is_empty() {
            match self.conn.transaction() {
                Ok(tx) => {
                    {
                        let mut stmt = tx.prepare_cached(Match::insert_sql())?;
                        for rec in buffer.drain(..) {
                            Match::bind_and_execute(&mut stmt, &rec)?;
                        }
                    }
                    tx.commit()?;
                }
                Err(e) if e.to_string().contains("database is locked") && attempts < 5 => {
                    attempts += 1;
                    sleep(Duration::from_millis(50 * attempts));
                }
                Err(e) => return Err(DbError::Sql(e)),
            }
        }
        Ok(())
    }
}
