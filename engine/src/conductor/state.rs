//! Orchestration graph states and transitions
//!
//! ```text
//! START → CLASSIFIED → WEATHER_PENDING → WEATHER_DONE → HAZARD_BLOCKED ─┐
//!             │                               │                        ├→ COMPOSED → END
//!             │                               └→ LODGING_PENDING → LODGING_DONE
//!             ├→ LODGING_PENDING (lodging only)                        │
//!             └→ COMPOSED (out of scope) ──────────────────────────────┘
//! ```
//!
//! [`GraphState::next`] says what to do from a state: move to another state
//! (pure work such as classification or hazard evaluation), run an effect
//! (call a specialist), commit the composed decision, or stop.
//! [`GraphState::resume`] feeds an effect's outcome back in. Neither does
//! any I/O.

use sdk::types::{SpecialistKind, SpecialistResult};

use super::compose::{compose, ComposeInput};
use super::types::{Decision, DecisionError, Plan};
use crate::policy::{HazardAssessment, HazardPolicy, Intent, IntentClassifier};
use crate::session::Turn;

/// Errors from driving the graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot apply a {outcome} outcome in state {state}")]
    IllegalResume {
        state: &'static str,
        outcome: &'static str,
    },

    #[error("{0} result is not terminal")]
    NonTerminal(SpecialistKind),

    #[error("decision rejected: {0}")]
    Decision(#[from] DecisionError),

    #[error("graph reached END without a composed decision")]
    Incomplete,
}

/// Read-only inputs for computing transitions
pub struct TransitionContext<'a> {
    pub text: &'a str,
    pub prior_turns: &'a [Turn],
    pub previous: Option<&'a Decision>,
    pub classifier: &'a IntentClassifier,
    pub hazard: &'a HazardPolicy,
}

/// Side effects the driver performs on the graph's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchWeather {
        location: Option<String>,
    },
    FetchLodging {
        location: Option<String>,
        /// Sanitized forecast to pass along as context
        weather_summary: Option<String>,
    },
}

impl Effect {
    pub fn specialist(&self) -> SpecialistKind {
        match self {
            Effect::FetchWeather { .. } => SpecialistKind::Weather,
            Effect::FetchLodging { .. } => SpecialistKind::Lodging,
        }
    }
}

/// Result of an effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Weather(SpecialistResult),
    Lodging(SpecialistResult),
}

impl Outcome {
    fn name(&self) -> &'static str {
        match self {
            Outcome::Weather(_) => "weather",
            Outcome::Lodging(_) => "lodging",
        }
    }
}

/// What the driver should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Goto(GraphState),
    Run(Effect),
    /// Append the exchange for the `Composed` decision, then move to `End`
    Commit,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphState {
    Start,
    Classified(Plan),
    WeatherPending(Plan),
    WeatherDone {
        plan: Plan,
        weather: SpecialistResult,
    },
    HazardBlocked {
        plan: Plan,
        weather: SpecialistResult,
        assessment: HazardAssessment,
    },
    LodgingPending {
        plan: Plan,
        weather: Option<SpecialistResult>,
        assessment: Option<HazardAssessment>,
    },
    LodgingDone {
        plan: Plan,
        weather: Option<SpecialistResult>,
        assessment: Option<HazardAssessment>,
        lodging: SpecialistResult,
    },
    Composed(Decision),
    End,
}

impl GraphState {
    pub fn name(&self) -> &'static str {
        match self {
            GraphState::Start => "START",
            GraphState::Classified(_) => "CLASSIFIED",
            GraphState::WeatherPending(_) => "WEATHER_PENDING",
            GraphState::WeatherDone { .. } => "WEATHER_DONE",
            GraphState::HazardBlocked { .. } => "HAZARD_BLOCKED",
            GraphState::LodgingPending { .. } => "LODGING_PENDING",
            GraphState::LodgingDone { .. } => "LODGING_DONE",
            GraphState::Composed(_) => "COMPOSED",
            GraphState::End => "END",
        }
    }

    /// Decide the next step from this state
    pub fn next(&self, ctx: &TransitionContext<'_>) -> Result<Next, TransitionError> {
        let next = match self {
            GraphState::Start => {
                let intent = ctx.classifier.classify_in_context(ctx.text, ctx.prior_turns);
                let location = ctx.classifier.location_hint(ctx.text).or_else(|| {
                    if intent.is_in_scope() {
                        ctx.previous
                            .and_then(|d| d.location_hint())
                            .map(str::to_string)
                    } else {
                        None
                    }
                });
                Next::Goto(GraphState::Classified(Plan { intent, location }))
            }

            GraphState::Classified(plan) => match plan.intent {
                Intent::WeatherQuery | Intent::LodgingWithSafetyCheck => {
                    Next::Goto(GraphState::WeatherPending(plan.clone()))
                }
                Intent::LodgingQuery => Next::Goto(GraphState::LodgingPending {
                    plan: plan.clone(),
                    weather: None,
                    assessment: None,
                }),
                Intent::OutOfScope => Next::Goto(GraphState::Composed(compose(&ComposeInput {
                    plan,
                    weather: None,
                    assessment: None,
                    lodging: None,
                    previous: ctx.previous,
                })?)),
            },

            GraphState::WeatherPending(plan) => Next::Run(Effect::FetchWeather {
                location: plan.location.clone(),
            }),

            GraphState::WeatherDone { plan, weather } => {
                if plan.intent.requires_safety_check() {
                    let assessment = ctx.hazard.evaluate(weather);
                    if assessment.hazard {
                        Next::Goto(GraphState::HazardBlocked {
                            plan: plan.clone(),
                            weather: weather.clone(),
                            assessment,
                        })
                    } else {
                        Next::Goto(GraphState::LodgingPending {
                            plan: plan.clone(),
                            weather: Some(weather.clone()),
                            assessment: Some(assessment),
                        })
                    }
                } else {
                    Next::Goto(GraphState::Composed(compose(&ComposeInput {
                        plan,
                        weather: Some(weather),
                        assessment: None,
                        lodging: None,
                        previous: ctx.previous,
                    })?))
                }
            }

            GraphState::HazardBlocked {
                plan,
                weather,
                assessment,
            } => Next::Goto(GraphState::Composed(compose(&ComposeInput {
                plan,
                weather: Some(weather),
                assessment: Some(assessment),
                lodging: None,
                previous: ctx.previous,
            })?)),

            GraphState::LodgingPending { plan, weather, .. } => Next::Run(Effect::FetchLodging {
                location: plan.location.clone(),
                weather_summary: weather
                    .as_ref()
                    .filter(|w| w.is_success() && !w.payload.trim().is_empty())
                    .map(|w| w.payload.clone()),
            }),

            GraphState::LodgingDone {
                plan,
                weather,
                assessment,
                lodging,
            } => Next::Goto(GraphState::Composed(compose(&ComposeInput {
                plan,
                weather: weather.as_ref(),
                assessment: assessment.as_ref(),
                lodging: Some(lodging),
                previous: ctx.previous,
            })?)),

            GraphState::Composed(_) => Next::Commit,

            GraphState::End => Next::Finished,
        };
        Ok(next)
    }

    /// Consume the outcome of the effect this state asked for
    pub fn resume(self, outcome: Outcome) -> Result<GraphState, TransitionError> {
        match (self, outcome) {
            (GraphState::WeatherPending(plan), Outcome::Weather(weather)) => {
                if !weather.status.is_terminal() {
                    return Err(TransitionError::NonTerminal(SpecialistKind::Weather));
                }
                Ok(GraphState::WeatherDone { plan, weather })
            }
            (
                GraphState::LodgingPending {
                    plan,
                    weather,
                    assessment,
                },
                Outcome::Lodging(lodging),
            ) => {
                if !lodging.status.is_terminal() {
                    return Err(TransitionError::NonTerminal(SpecialistKind::Lodging));
                }
                Ok(GraphState::LodgingDone {
                    plan,
                    weather,
                    assessment,
                    lodging,
                })
            }
            (state, outcome) => Err(TransitionError::IllegalResume {
                state: state.name(),
                outcome: outcome.name(),
            }),
        }
    }

    /// Take the decision out of a `Composed` state
    pub fn into_decision(self) -> Option<Decision> {
        match self {
            GraphState::Composed(decision) => Some(decision),
            _ => None,
        }
    }
}
