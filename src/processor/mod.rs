// src/processor/mod.rs

//! The stateful consumer that turns a stream of events into a stream of
//! matches while staying responsive to out-of-band control commands.
//!
//! One logical consumer task runs `process()`; any number of producer tasks
//! feed the shared event queue, and the control API feeds a private command
//! queue.  The engine is only ever replaced from inside the loop (or before
//! it starts), published as an immutable snapshot behind an `Arc` swap.

pub mod sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::events::{Event, Match};
use crate::pipeline::AckQueue;
use crate::rules::{Engine, RuleError, RuleSet};

pub use sink::MatchSink;

/// Out-of-band control directives, delivered through a side channel
/// parallel to the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Recompile,
    Stop,
}

/// Consumes events from the shared queue, matches them against the compiled
/// engine, and emits results to the sink.
pub struct MatchProcessor {
    processing: AtomicBool,
    stopped: AtomicBool,
    rules: Mutex<RuleSet>,
    engine: RwLock<Arc<Engine>>,
    /// Outcome of the most recent engine rebuild: `None` on success, the
    /// error message when the rebuild was rejected.  Lets blocking callers
    /// of `compile_rules` tell "recompiled" from "still on old rules".
    last_compile: Mutex<Option<String>>,
    event_queue: Arc<AckQueue<Event>>,
    cmd_queue: AckQueue<Command>,
    sink: Arc<dyn MatchSink>,
}

impl MatchProcessor {
    /// Resolve `locators`, build the initial rule set and compile it.
    ///
    /// Invalid rule sources abort construction entirely; there is no
    /// partially-initialized processor.
    pub fn new(
        locators: &[String],
        event_queue: Arc<AckQueue<Event>>,
        sink: Arc<dyn MatchSink>,
    ) -> Result<Self, RuleError> {
        let rules = RuleSet::from_locators(locators)?;
        let engine = Engine::compile(&rules)?;
        log::info!(
            "processor ready: {} rule(s) from {} source(s)",
            engine.rule_count(),
            rules.len()
        );
        Ok(Self {
            processing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            rules: Mutex::new(rules),
            engine: RwLock::new(Arc::new(engine)),
            last_compile: Mutex::new(None),
            event_queue,
            cmd_queue: AckQueue::unbounded(),
            sink,
        })
    }

    /// Resolve and merge additional rule sources.
    ///
    /// With `append` the new entries are unioned in (replace wins on
    /// namespace collision); otherwise the whole rule set is replaced.  The
    /// live engine is untouched unless `recompile` is set.
    pub async fn add_rules(
        &self,
        locators: &[String],
        append: bool,
        recompile: bool,
    ) -> Result<(), RuleError> {
        log::info!(
            "refreshing rule set ({})",
            if append { "appending" } else { "replacing" }
        );
        {
            let mut rules = self.rules.lock().unwrap();
            if append {
                rules.extend_from_locators(locators)?;
            } else {
                *rules = RuleSet::from_locators(locators)?;
            }
        }
        if recompile {
            self.compile_rules(false, false).await?;
        }
        Ok(())
    }

    /// Rebuild the engine from the current rule set.
    ///
    /// With `immediate`, or while the loop is not running, the rebuild
    /// happens on the caller's own context and errors surface here.
    /// `immediate = true` while the loop is running is unsafe (the loop may
    /// be matching against the engine being replaced) and exists only for
    /// pre-start or paused states.
    ///
    /// Otherwise a `Recompile` command is enqueued; with `block` the call
    /// waits until the loop has honored it and reports the recorded outcome,
    /// so an `Ok` return guarantees the next match uses the new engine.
    pub async fn compile_rules(&self, immediate: bool, block: bool) -> Result<(), RuleError> {
        if immediate || !self.processing.load(Ordering::SeqCst) {
            return self.rebuild_engine();
        }
        self.cmd_queue
            .enqueue(Command::Recompile)
            .await
            .map_err(|_| RuleError::ControlClosed)?;
        if block {
            self.cmd_queue.wait_all().await;
            if let Some(msg) = self.last_compile.lock().unwrap().clone() {
                return Err(RuleError::Rejected(msg));
            }
        }
        Ok(())
    }

    /// Stop the loop.
    ///
    /// Graceful: enqueue `Stop`; the loop finishes exactly the items
    /// buffered at the moment it dequeues the command, then terminates.
    /// Immediate: first drop every currently-buffered event unmatched
    /// (through the same dequeue/acknowledge accounting), then enqueue
    /// `Stop` so the loop sees zero remaining items.
    pub async fn stop_processing(&self, immediate: bool) -> Result<(), RuleError> {
        log::info!(
            "stop requested ({})",
            if immediate { "immediate" } else { "graceful" }
        );
        if immediate {
            let buffered = self.event_queue.events_left();
            let mut dropped = 0usize;
            for _ in 0..buffered {
                match self.event_queue.try_dequeue() {
                    Some(event) => {
                        self.event_queue.acknowledge();
                        dropped += 1;
                        log::debug!("dropped buffered event {}", event.id);
                    }
                    // The loop got there first; nothing left to drop.
                    None => break,
                }
            }
            if dropped > 0 {
                log::info!("dropped {} buffered event(s) without scanning", dropped);
            }
        }
        self.cmd_queue
            .enqueue(Command::Stop)
            .await
            .map_err(|_| RuleError::ControlClosed)
    }

    /// The main loop.  Multiplexes the event and command queues without
    /// busy-polling, runs until a `Stop` command's drain budget is spent,
    /// and is terminal: a finished processor cannot be restarted.
    pub async fn process(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            log::warn!("process() called on a stopped processor; ignoring");
            return;
        }
        log::info!("processing started");
        self.processing.store(true, Ordering::SeqCst);

        // Effectively infinite until a Stop command fixes the real budget.
        let mut items_remaining = u64::MAX;
        let mut items_processed: u64 = 0;

        while items_processed < items_remaining {
            tokio::select! {
                command = self.cmd_queue.dequeue() => {
                    match command {
                        Command::Recompile => {
                            log::info!("recompile command received");
                            self.processing.store(false, Ordering::SeqCst);
                            if let Err(e) = self.rebuild_engine() {
                                log::error!("recompile rejected, previous engine stays active: {}", e);
                            }
                            self.processing.store(true, Ordering::SeqCst);
                        }
                        Command::Stop => {
                            // The cutoff is the buffer depth at this instant;
                            // later arrivals stay buffered and are never
                            // processed.
                            let left = self.event_queue.events_left() as u64;
                            items_remaining = items_processed.saturating_add(left);
                            if left == 0 {
                                log::info!("stop command received, stopping immediately");
                            } else {
                                log::info!("stop command received, stopping after {} item(s)", left);
                            }
                        }
                    }
                    self.cmd_queue.acknowledge();
                }
                event = self.event_queue.dequeue() => {
                    items_processed += 1;
                    let engine = self.engine.read().unwrap().clone();
                    match engine.scan(&event.raw_content) {
                        Ok(hits) => {
                            for hit in hits {
                                self.sink.emit(Match::from_hit(hit, &event)).await;
                            }
                        }
                        // Recoverable: the event just yields zero matches
                        // but still counts toward any active drain budget.
                        Err(e) => log::warn!(
                            "scan failed for event {} from {}: {}",
                            event.id,
                            event.source_type,
                            e
                        ),
                    }
                    self.event_queue.acknowledge();
                }
            }
        }

        self.processing.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        log::info!("processing stopped after {} item(s)", items_processed);
    }

    /// Compile a snapshot of the current rules and atomically publish the
    /// new engine.  On failure the previous engine stays in place and the
    /// outcome is recorded for blocking callers.
    fn rebuild_engine(&self) -> Result<(), RuleError> {
        let snapshot = self.rules.lock().unwrap().clone();
        match Engine::compile(&snapshot) {
            Ok(engine) => {
                log::info!("rule engine rebuilt: {} rule(s)", engine.rule_count());
                *self.engine.write().unwrap() = Arc::new(engine);
                *self.last_compile.lock().unwrap() = None;
                Ok(())
            }
            Err(e) => {
                *self.last_compile.lock().unwrap() = Some(e.to_string());
                Err(e)
            }
        }
    }
}
