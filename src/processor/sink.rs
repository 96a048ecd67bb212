// src/processor/sink.rs

//! Downstream hand-off of matches.
//!
//! Fire-and-forget: the processor never waits for the sink to persist or
//! alert on a match, and failures downstream are the sink's problem.

use async_trait::async_trait;

use crate::events::Match;
use crate::pipeline::AckQueue;

#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn emit(&self, m: Match);
}

/// The shipped sink: an unbounded match queue drained by the database
/// writer.  Enqueue never blocks; a closed queue drops the match with a
/// warning.
#[async_trait]
impl MatchSink for AckQueue<Match> {
    async fn emit(&self, m: Match) {
        log::debug!(
            "match: rule={} tags={:?} event={} regions={}",
            m.rule_name,
            m.tags,
            m.event_id,
            m.regions.len()
        );
        if self.enqueue(m).await.is_err() {
            log::warn!("match sink queue closed, dropping match");
        }
    }
}
