// src/pipeline/queue.rs

//! Bounded FIFO channel with a consumer acknowledgment protocol.
//!
//! A plain bounded channel gives backpressure but no way to know how many
//! more items will flow before a control point is honored.  `AckQueue`
//! tracks enqueued / dequeued / acknowledged counts separately from buffer
//! occupancy, which is what makes exact-count graceful drain and blocking
//! control operations (`wait_all`) possible.
//!
//! Contract:
//! - any number of producers, exactly one logical consumer per queue;
//! - a backpressure slot is freed by `acknowledge`, not by `dequeue`;
//! - `acknowledge` must be called exactly once per successful dequeue,
//!   before the next dequeue on the same queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::Notify;

/// Enqueue attempted on a queue that has been permanently closed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("queue is closed")]
pub struct QueueClosed;

struct State<T> {
    buf: VecDeque<T>,
    enqueued: u64,
    dequeued: u64,
    acked: u64,
    closed: bool,
}

/// Ordered buffer with capacity-based producer backpressure and an
/// acknowledgment watermark.  Capacity 0 means unbounded.
pub struct AckQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    space: Notify,
    item: Notify,
    ack: Notify,
}

impl<T> AckQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                buf: VecDeque::new(),
                enqueued: 0,
                dequeued: 0,
                acked: 0,
                closed: false,
            }),
            space: Notify::new(),
            item: Notify::new(),
            ack: Notify::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Append an item, suspending while `capacity` items are enqueued but
    /// not yet acknowledged.  Never drops.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        loop {
            // Register interest before checking the condition so a wakeup
            // issued between the check and the await is not lost.
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut s = self.state.lock().unwrap();
                if s.closed {
                    return Err(QueueClosed);
                }
                if self.capacity == 0 || s.enqueued - s.acked < self.capacity as u64 {
                    s.buf.push_back(item);
                    s.enqueued += 1;
                    drop(s);
                    self.item.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Remove and return the oldest buffered item, suspending while empty.
    ///
    /// Cancel-safe: the item is only taken out of the buffer in the poll
    /// that returns it, so a raced-and-dropped `dequeue` future consumes
    /// nothing.
    pub async fn dequeue(&self) -> T {
        loop {
            let notified = self.item.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut s = self.state.lock().unwrap();
                if let Some(v) = s.buf.pop_front() {
                    s.dequeued += 1;
                    return v;
                }
            }
            notified.await;
        }
    }

    /// Non-suspending variant of `dequeue`, sharing the same accounting.
    /// Used by the immediate-stop drop path.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut s = self.state.lock().unwrap();
        let v = s.buf.pop_front();
        if v.is_some() {
            s.dequeued += 1;
        }
        v
    }

    /// Signal that the most recently dequeued item is done: frees one
    /// backpressure slot and advances the `wait_all` watermark.
    pub fn acknowledge(&self) {
        {
            let mut s = self.state.lock().unwrap();
            if s.acked >= s.dequeued {
                log::warn!("acknowledge without a matching dequeue; ignored");
                return;
            }
            s.acked += 1;
        }
        self.space.notify_one();
        self.ack.notify_waiters();
    }

    /// Snapshot of items buffered and not yet dequeued.  Racy against
    /// concurrent enqueues; callers needing an exact cutoff must treat the
    /// returned value as authoritative at the instant of the call.
    pub fn events_left(&self) -> usize {
        self.state.lock().unwrap().buf.len()
    }

    /// Suspend until every item enqueued up to this call has been
    /// acknowledged.  Stalls forever if the consumer stops acknowledging.
    pub async fn wait_all(&self) {
        let cutoff = self.state.lock().unwrap().enqueued;
        loop {
            let notified = self.ack.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.lock().unwrap().acked >= cutoff {
                return;
            }
            notified.await;
        }
    }

    /// Permanently close the queue.  Blocked and future producers get
    /// `QueueClosed`; already-buffered items stay dequeueable.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.space.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}
