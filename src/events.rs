// src/events.rs

//! Event and match model used across the pipeline.
//!
//! An `Event` is one unit of fetched content on its way to the rule engine; a
//! `Match` is one rule's positive result against one event, carrying enough
//! context to be persisted or alerted on without the original event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::engine::RuleHit;

/// One unit of fetched content to be scanned.
///
/// Created by a source, consumed exactly once by the processor, then dropped
/// (its interesting parts live on inside any `Match` it produced).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Source-assigned identifier, unique per `source_type`.
    pub id: String,
    /// Which kind of feed produced this event (e.g. `github-public-events`).
    pub source_type: String,
    /// Raw bytes handed to the rule engine. Not necessarily UTF-8.
    pub raw_content: Vec<u8>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        source_type: impl Into<String>,
        raw_content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            source_type: source_type.into(),
            raw_content: raw_content.into(),
        }
    }
}

/// A region of event content that one rule string matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRegion {
    /// Label of the string inside the rule that hit.
    pub label: String,
    /// Byte offset of the hit inside the event content.
    pub offset: u64,
    /// The matched bytes, lossily decoded for display and storage.
    pub data: String,
}

/// One rule's positive result against one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub ts: DateTime<Utc>,
    pub event_id: String,
    pub source_type: String,
    /// Namespace of the rule source file the rule came from.
    pub namespace: String,
    pub rule_name: String,
    pub tags: Vec<String>,
    pub regions: Vec<MatchRegion>,
}

impl Match {
    /// Attach event context to an engine-level hit.
    pub fn from_hit(hit: RuleHit, event: &Event) -> Self {
        Self {
            ts: Utc::now(),
            event_id: event.id.clone(),
            source_type: event.source_type.clone(),
            namespace: hit.namespace,
            rule_name: hit.rule_name,
            tags: hit.tags,
            regions: hit.regions,
        }
    }
}
