//! Conductor
//!
//! Runs one conversation turn as an explicit state graph: classify the
//! request, consult the weather specialist, gate lodging on the hazard
//! policy, then compose a single reply.

pub mod compose;
pub mod events;
pub mod graph;
pub mod state;
pub mod types;

pub use compose::{compose, ComposeInput, BLOCKED_TEXT, OUT_OF_SCOPE_TEXT};
pub use events::{EventSink, TurnEvent};
pub use graph::{Orchestrator, TurnError, TurnReply};
pub use state::{Effect, GraphState, Next, Outcome, TransitionContext, TransitionError};
pub use types::{Decision, DecisionError, DecisionParts, Plan};
