//! Signature rule handling: locator resolution, the mutable rule set, and
//! the compiled matching engine built from it.

pub mod engine;
pub mod set;

pub use engine::{Engine, RuleHit, ScanError};
pub use set::{RuleError, RuleSet};
