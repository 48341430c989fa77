//! Deterministic policy rules
//!
//! - [`intent`]: maps raw user text to one of a fixed set of intents
//! - [`hazard`]: maps a weather result to allow/block with a rationale
//!
//! Both are pure functions over configured term lists. They are auditable
//! rules, not learned classifiers.

pub mod hazard;
pub mod intent;

pub use hazard::{HazardAssessment, HazardPolicy};
pub use intent::{Intent, IntentClassifier};
