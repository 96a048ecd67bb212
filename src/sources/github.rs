// src/sources/github.rs

//! GitHub public-events poller.
//!
//! Fetches the latest public events, keeps only `PushEvent`s, filters out
//! ids already recorded in the index cache, and yields each remaining
//! event's payload JSON as raw content for the rule engine.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, USER_AGENT};

use crate::config::types::GithubSourceConfig;
use crate::db::IndexCache;
use crate::events::Event;
use crate::sources::EventSource;

pub const SOURCE_TYPE: &str = "github-public-events";

const EVENTS_URI: &str = "https://api.github.com/events";
const API_VERSION: &str = "application/vnd.github.v3+json";

pub struct GithubSource {
    name: String,
    oauth: Option<String>,
    interval: Duration,
    client: reqwest::Client,
    /// Conditional-request tag; GitHub returns 304 when nothing changed.
    etag: Option<String>,
    index_cache: IndexCache,
}

impl GithubSource {
    pub fn new(config: GithubSourceConfig, interval: Duration, index_cache: IndexCache) -> Self {
        Self {
            name: config.name.unwrap_or_else(|| SOURCE_TYPE.to_owned()),
            oauth: config.oauth,
            interval,
            client: reqwest::Client::new(),
            etag: None,
            index_cache,
        }
    }
}

#[async_trait]
impl EventSource for GithubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch_events(&mut self) -> anyhow::Result<Vec<Event>> {
        let mut request = self
            .client
            .get(EVENTS_URI)
            .header(USER_AGENT, "sigwatch")
            .header(ACCEPT, API_VERSION);
        if let Some(token) = &self.oauth {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }
        if let Some(etag) = &self.etag {
            request = request.header(IF_NONE_MATCH, etag.clone());
        }

        let response = request.send().await.context("events request failed")?;
        if response.status() == StatusCode::NOT_MODIFIED {
            log::debug!("{}: no changes since last poll", self.name);
            return Ok(Vec::new());
        }
        let response = response.error_for_status().context("events request rejected")?;
        if let Some(etag) = response.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
            self.etag = Some(etag.to_owned());
        }

        let payload: Vec<serde_json::Value> =
            response.json().await.context("malformed events payload")?;
        log::debug!("{}: fetched {} public event(s)", self.name, payload.len());

        // Only PushEvents carry content worth scanning.
        let pushes: Vec<&serde_json::Value> =
            payload.iter().filter(|e| e["type"] == "PushEvent").collect();

        let seen = self
            .index_cache
            .query_index_cache()
            .context("index cache query failed")?;

        let mut events = Vec::new();
        let mut new_ids = Vec::new();
        for raw in pushes {
            let Some(id) = raw["id"].as_str() else {
                continue;
            };
            if seen.contains(id) {
                continue;
            }
            new_ids.push(id.to_owned());
            events.push(Event::new(id, SOURCE_TYPE, serde_json::to_vec(raw)?));
        }

        self.index_cache
            .update_index_cache(&new_ids)
            .context("index cache update failed")?;

        log::debug!("{}: {} push event(s) not in cache", self.name, events.len());
        Ok(events)
    }
}
