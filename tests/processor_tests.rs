//! Integration tests for the matching consumer loop.
//!
//! Key responsibilities:
//! - End-to-end: buffered events scanned, matches emitted, queue drained.
//! - Exact-count drain on graceful stop; buffered drop on immediate stop.
//! - Blocking recompile is observable on the next match.
//! - Rejected recompiles keep the last-known-good engine.
//! - A stopped processor is terminal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use sigwatch::events::{Event, Match};
use sigwatch::pipeline::AckQueue;
use sigwatch::processor::{MatchProcessor, MatchSink};
use sigwatch::rules::RuleError;

const LONG: Duration = Duration::from_secs(5);
const SHORT: Duration = Duration::from_millis(200);

fn write_rule(dir: &Path, file: &str, name: &str, pattern: &str) -> String {
    let path: PathBuf = dir.join(file);
    fs::write(
        &path,
        format!("[[rules]]\nname = \"{name}\"\ntags = [\"test\"]\n\n[rules.strings]\ns = \"{pattern}\"\n"),
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

fn event(id: &str, content: &str) -> Event {
    Event::new(id, "test-feed", content.as_bytes())
}

struct Fixture {
    event_queue: Arc<AckQueue<Event>>,
    match_queue: Arc<AckQueue<Match>>,
    processor: Arc<MatchProcessor>,
}

fn fixture(locators: &[String]) -> Fixture {
    let event_queue = Arc::new(AckQueue::new(16));
    let match_queue = Arc::new(AckQueue::unbounded());
    let processor = Arc::new(
        MatchProcessor::new(
            locators,
            Arc::clone(&event_queue),
            Arc::clone(&match_queue) as Arc<dyn MatchSink>,
        )
        .unwrap(),
    );
    Fixture { event_queue, match_queue, processor }
}

fn drain_matches(queue: &AckQueue<Match>) -> Vec<Match> {
    let mut out = Vec::new();
    while let Some(m) = queue.try_dequeue() {
        queue.acknowledge();
        out.push(m);
    }
    out
}

#[tokio::test]
async fn end_to_end_buffered_events_are_scanned_then_loop_stops() {
    let dir = tempfile::tempdir().unwrap();
    let rule = write_rule(dir.path(), "malware.toml", "malware_literal", "malware");
    let fx = fixture(&[rule]);

    fx.event_queue.enqueue(event("1", "this blob contains malware today")).await.unwrap();
    fx.event_queue.enqueue(event("2", "perfectly clean content")).await.unwrap();
    fx.event_queue.enqueue(event("3", "more malware over here")).await.unwrap();
    fx.processor.stop_processing(false).await.unwrap();

    let processor = Arc::clone(&fx.processor);
    let loop_task = tokio::spawn(async move { processor.process().await });
    timeout(LONG, loop_task).await.expect("loop did not stop").unwrap();

    let matches = drain_matches(&fx.match_queue);
    assert_eq!(matches.len(), 2);
    for m in &matches {
        assert_eq!(m.rule_name, "malware_literal");
        assert_eq!(m.source_type, "test-feed");
    }
    assert_eq!(fx.event_queue.events_left(), 0);
}

#[tokio::test]
async fn graceful_stop_drains_exactly_the_buffered_items() {
    let dir = tempfile::tempdir().unwrap();
    let rule = write_rule(dir.path(), "hit.toml", "hit", "payload");
    let fx = fixture(&[rule]);

    for i in 0..3 {
        fx.event_queue.enqueue(event(&i.to_string(), "payload")).await.unwrap();
    }
    fx.processor.stop_processing(false).await.unwrap();

    let processor = Arc::clone(&fx.processor);
    let loop_task = tokio::spawn(async move { processor.process().await });
    timeout(LONG, loop_task).await.expect("loop did not stop").unwrap();

    // Late arrivals stay buffered, unconsumed.
    fx.event_queue.enqueue(event("late-1", "payload")).await.unwrap();
    fx.event_queue.enqueue(event("late-2", "payload")).await.unwrap();

    assert_eq!(drain_matches(&fx.match_queue).len(), 3);
    assert_eq!(fx.event_queue.events_left(), 2);
}

#[tokio::test]
async fn immediate_stop_drops_buffered_items_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let rule = write_rule(dir.path(), "hit.toml", "hit", "payload");
    let fx = fixture(&[rule]);

    for i in 0..4 {
        fx.event_queue.enqueue(event(&i.to_string(), "payload")).await.unwrap();
    }
    fx.processor.stop_processing(true).await.unwrap();

    let processor = Arc::clone(&fx.processor);
    let loop_task = tokio::spawn(async move { processor.process().await });
    timeout(LONG, loop_task).await.expect("loop did not stop").unwrap();

    assert!(drain_matches(&fx.match_queue).is_empty());
    assert_eq!(fx.event_queue.events_left(), 0);
}

#[tokio::test]
async fn blocking_recompile_is_visible_to_the_next_event() {
    let dir = tempfile::tempdir().unwrap();
    let rule_a = write_rule(dir.path(), "a.toml", "alpha_rule", "alpha");
    let fx = fixture(&[rule_a]);

    let processor = Arc::clone(&fx.processor);
    let mut loop_task = tokio::spawn(async move { processor.process().await });

    // Not matched by the old rule set.  Waiting for its acknowledgment also
    // guarantees the loop is live before the deferred recompile below.
    fx.event_queue.enqueue(event("1", "only beta content")).await.unwrap();
    fx.event_queue.wait_all().await;

    let rule_b = write_rule(dir.path(), "b.toml", "beta_rule", "beta");
    fx.processor.add_rules(&[rule_b], true, false).await.unwrap();
    fx.processor.compile_rules(false, true).await.unwrap();

    // The new engine is live; an event pushed now must match.
    fx.event_queue.enqueue(event("2", "fresh beta content")).await.unwrap();
    fx.processor.stop_processing(false).await.unwrap();
    timeout(LONG, &mut loop_task).await.expect("loop did not stop").unwrap();

    let matches = drain_matches(&fx.match_queue);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule_name, "beta_rule");
    assert_eq!(matches[0].event_id, "2");
}

#[tokio::test]
async fn rejected_recompile_keeps_last_known_good_engine() {
    let dir = tempfile::tempdir().unwrap();
    let rule_a = write_rule(dir.path(), "a.toml", "alpha_rule", "alpha");
    let fx = fixture(&[rule_a]);

    let processor = Arc::clone(&fx.processor);
    let mut loop_task = tokio::spawn(async move { processor.process().await });

    // Make sure the loop is live so the recompile goes through the command
    // queue rather than the immediate path.
    fx.event_queue.enqueue(event("0", "warmup")).await.unwrap();
    fx.event_queue.wait_all().await;

    // Merge a rule source with an invalid pattern, then ask for a blocking
    // recompile: the caller must see the rejection.
    let bad = write_rule(dir.path(), "bad.toml", "broken", "(");
    fx.processor.add_rules(&[bad], true, false).await.unwrap();
    let err = fx.processor.compile_rules(false, true).await.unwrap_err();
    assert!(matches!(err, RuleError::Rejected(_)));

    // The previous engine still matches.
    fx.event_queue.enqueue(event("1", "alpha still works")).await.unwrap();
    fx.processor.stop_processing(false).await.unwrap();
    timeout(LONG, &mut loop_task).await.expect("loop did not stop").unwrap();

    let matches = drain_matches(&fx.match_queue);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule_name, "alpha_rule");
}

#[tokio::test]
async fn appending_the_same_locators_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let rule = write_rule(dir.path(), "a.toml", "alpha_rule", "alpha");
    let locators = vec![rule];
    let fx = fixture(&locators);

    fx.processor.add_rules(&locators, true, true).await.unwrap();
    fx.processor.add_rules(&locators, true, true).await.unwrap();

    fx.event_queue.enqueue(event("1", "alpha content")).await.unwrap();
    fx.processor.stop_processing(false).await.unwrap();

    let processor = Arc::clone(&fx.processor);
    let loop_task = tokio::spawn(async move { processor.process().await });
    timeout(LONG, loop_task).await.expect("loop did not stop").unwrap();

    // One rule, one hit; duplicated namespaces would have doubled it.
    assert_eq!(drain_matches(&fx.match_queue).len(), 1);
}

#[tokio::test]
async fn construction_fails_on_invalid_rule_sources() {
    let dir = tempfile::tempdir().unwrap();
    let bad = write_rule(dir.path(), "bad.toml", "broken", "(");

    let event_queue = Arc::new(AckQueue::new(4));
    let match_queue: Arc<AckQueue<Match>> = Arc::new(AckQueue::unbounded());
    let result = MatchProcessor::new(
        &[bad],
        event_queue,
        match_queue as Arc<dyn MatchSink>,
    );
    assert!(matches!(result, Err(RuleError::Pattern(_, _, _))));
}

#[tokio::test]
async fn stopped_processor_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let rule = write_rule(dir.path(), "a.toml", "alpha_rule", "alpha");
    let fx = fixture(&[rule]);

    fx.processor.stop_processing(false).await.unwrap();
    let processor = Arc::clone(&fx.processor);
    let loop_task = tokio::spawn(async move { processor.process().await });
    timeout(LONG, loop_task).await.expect("loop did not stop").unwrap();

    // A second run returns at once instead of consuming anything.
    fx.event_queue.enqueue(event("1", "alpha")).await.unwrap();
    timeout(SHORT, fx.processor.process()).await.expect("restarted a stopped processor");
    assert_eq!(fx.event_queue.events_left(), 1);
}
