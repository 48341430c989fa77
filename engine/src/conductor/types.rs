//! Conductor data types
//!
//! [`Decision`] records what the orchestrator decided for one turn and why.
//! Its fields are private and every construction path goes through
//! [`Decision::new`], which rejects a lodging result alongside a hazard flag.

use sdk::types::SpecialistResult;
use serde::{Deserialize, Serialize};

use crate::policy::Intent;

/// Classification output carried through the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub intent: Intent,
    /// Destination extracted from the user's text, e.g. "Seattle, WA"
    pub location: Option<String>,
}

/// Raw decision fields, checked on conversion into [`Decision`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionParts {
    pub intent: Intent,
    pub hazard: bool,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<SpecialistResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lodging: Option<SpecialistResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
    #[serde(default)]
    pub policy_notes: Vec<String>,
    pub composed_text: String,
}

/// Reasons a set of decision fields is inconsistent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("lodging result present although a hazard was flagged")]
    LodgingWhileHazard,

    #[error("{0} decision cannot carry a {1} result")]
    UnexpectedResult(Intent, &'static str),
}

/// Outcome of one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DecisionParts", into = "DecisionParts")]
pub struct Decision {
    intent: Intent,
    hazard: bool,
    rationale: String,
    weather: Option<SpecialistResult>,
    lodging: Option<SpecialistResult>,
    location_hint: Option<String>,
    policy_notes: Vec<String>,
    composed_text: String,
}

impl Decision {
    pub fn new(parts: DecisionParts) -> Result<Self, DecisionError> {
        if parts.hazard && parts.lodging.is_some() {
            return Err(DecisionError::LodgingWhileHazard);
        }
        match parts.intent {
            Intent::OutOfScope if parts.weather.is_some() => {
                return Err(DecisionError::UnexpectedResult(parts.intent, "weather"));
            }
            Intent::OutOfScope | Intent::WeatherQuery if parts.lodging.is_some() => {
                return Err(DecisionError::UnexpectedResult(parts.intent, "lodging"));
            }
            Intent::LodgingQuery if parts.weather.is_some() => {
                return Err(DecisionError::UnexpectedResult(parts.intent, "weather"));
            }
            _ => {}
        }

        Ok(Self {
            intent: parts.intent,
            hazard: parts.hazard,
            rationale: parts.rationale,
            weather: parts.weather,
            lodging: parts.lodging,
            location_hint: parts.location_hint,
            policy_notes: parts.policy_notes,
            composed_text: parts.composed_text,
        })
    }

    /// Decision for a request outside the supported domains
    pub fn out_of_scope(composed_text: impl Into<String>) -> Self {
        Self {
            intent: Intent::OutOfScope,
            hazard: false,
            rationale: "The request is outside the weather and lodging domains.".to_string(),
            weather: None,
            lodging: None,
            location_hint: None,
            policy_notes: Vec::new(),
            composed_text: composed_text.into(),
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn hazard(&self) -> bool {
        self.hazard
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn weather(&self) -> Option<&SpecialistResult> {
        self.weather.as_ref()
    }

    pub fn lodging(&self) -> Option<&SpecialistResult> {
        self.lodging.as_ref()
    }

    pub fn location_hint(&self) -> Option<&str> {
        self.location_hint.as_deref()
    }

    pub fn policy_notes(&self) -> &[String] {
        &self.policy_notes
    }

    pub fn composed_text(&self) -> &str {
        &self.composed_text
    }
}

impl TryFrom<DecisionParts> for Decision {
    type Error = DecisionError;

    fn try_from(parts: DecisionParts) -> Result<Self, Self::Error> {
        Decision::new(parts)
    }
}

impl From<Decision> for DecisionParts {
    fn from(decision: Decision) -> Self {
        Self {
            intent: decision.intent,
            hazard: decision.hazard,
            rationale: decision.rationale,
            weather: decision.weather,
            lodging: decision.lodging,
            location_hint: decision.location_hint,
            policy_notes: decision.policy_notes,
            composed_text: decision.composed_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::SpecialistKind;

    fn parts() -> DecisionParts {
        DecisionParts {
            intent: Intent::LodgingWithSafetyCheck,
            hazard: false,
            rationale: "clear".to_string(),
            weather: Some(SpecialistResult::success(SpecialistKind::Weather, "Sunny")),
            lodging: Some(SpecialistResult::success(SpecialistKind::Lodging, "Loft")),
            location_hint: Some("LA, CA".to_string()),
            policy_notes: Vec::new(),
            composed_text: "text".to_string(),
        }
    }

    #[test]
    fn test_rejects_lodging_with_hazard() {
        let mut parts = parts();
        parts.hazard = true;
        assert_eq!(
            Decision::new(parts).unwrap_err(),
            DecisionError::LodgingWhileHazard
        );
    }

    #[test]
    fn test_rejects_lodging_for_weather_query() {
        let mut parts = parts();
        parts.intent = Intent::WeatherQuery;
        assert!(Decision::new(parts).is_err());
    }

    #[test]
    fn test_deserialization_enforces_invariant() {
        let mut parts = parts();
        parts.hazard = true;
        let json = serde_json::to_string(&parts).unwrap();
        assert!(serde_json::from_str::<Decision>(&json).is_err());

        let json = serde_json::to_string(&self::parts()).unwrap();
        let decision: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision.location_hint(), Some("LA, CA"));
    }
}
