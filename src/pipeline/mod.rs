//! Queue primitives the processing pipeline is built on.

pub mod queue;

pub use queue::{AckQueue, QueueClosed};
