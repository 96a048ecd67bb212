// src/sources/mod.rs

//! Feed connectors.
//!
//! Every source exposes the same capability: fetch new events on its own
//! schedule and push them into the shared event queue.  Sources are selected
//! by a factory keyed on the `[[sources]]` config type; adding a feed means
//! one new implementation and one new factory arm.

pub mod github;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;

use crate::config::loader::parse_interval;
use crate::config::types::{ConfigError, SourceConfig};
use crate::db::IndexCache;
use crate::events::Event;
use crate::pipeline::AckQueue;

#[async_trait]
pub trait EventSource: Send {
    fn name(&self) -> &str;

    /// Delay between fetch cycles.
    fn interval(&self) -> Duration;

    /// One fetch cycle: new, deduplicated events ready for scanning.
    async fn fetch_events(&mut self) -> anyhow::Result<Vec<Event>>;

    /// Repeats `fetch_events` forever on the source's schedule, enqueueing
    /// every event.  A failed cycle is logged and skipped; the next tick
    /// proceeds normally.
    async fn fetch_events_scheduled(&mut self, queue: Arc<AckQueue<Event>>) {
        loop {
            match self.fetch_events().await {
                Ok(events) => {
                    let count = events.len();
                    for event in events {
                        if queue.enqueue(event).await.is_err() {
                            log::warn!("{}: event queue closed, stopping schedule", self.name());
                            return;
                        }
                    }
                    if count > 0 {
                        log::debug!("{}: enqueued {} event(s)", self.name(), count);
                    }
                }
                Err(e) => {
                    log::warn!("{}: fetch cycle failed, retrying next tick: {:#}", self.name(), e);
                }
            }
            tokio::time::sleep(self.interval()).await;
        }
    }
}

/// Build one source per configured entry, wiring each to its own
/// deduplication cache view over the shared connection.
pub fn build_sources(
    configs: &[SourceConfig],
    conn: &Arc<Mutex<Connection>>,
) -> Result<Vec<Box<dyn EventSource>>, ConfigError> {
    let mut sources: Vec<Box<dyn EventSource>> = Vec::with_capacity(configs.len());
    for config in configs {
        match config {
            SourceConfig::Github(gh) => {
                let interval = parse_interval(&gh.interval)?;
                let cache = IndexCache::new(Arc::clone(conn), github::SOURCE_TYPE);
                sources.push(Box::new(github::GithubSource::new(gh.clone(), interval, cache)));
            }
        }
    }
    Ok(sources)
}
