//! Intent classification
//!
//! Every turn is classified exactly once, before any specialist is called.
//! Classification is rule based:
//!
//! - lodging term AND (weather term OR safety term OR location OR date)
//!   → [`Intent::LodgingWithSafetyCheck`]
//! - lodging term alone → [`Intent::LodgingQuery`]
//! - weather term → [`Intent::WeatherQuery`]
//! - otherwise → [`Intent::OutOfScope`]
//!
//! Term lists come from `[policy]` in the config file. Location and date
//! patterns are fixed.

use regex::Regex;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PolicyConfig;
use crate::session::{Role, Turn};

/// What the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    WeatherQuery,
    LodgingQuery,
    LodgingWithSafetyCheck,
    OutOfScope,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::WeatherQuery => "WEATHER_QUERY",
            Intent::LodgingQuery => "LODGING_QUERY",
            Intent::LodgingWithSafetyCheck => "LODGING_WITH_SAFETY_CHECK",
            Intent::OutOfScope => "OUT_OF_SCOPE",
        }
    }

    /// The weather specialist is consulted first
    pub fn needs_weather(&self) -> bool {
        matches!(
            self,
            Intent::WeatherQuery | Intent::LodgingWithSafetyCheck
        )
    }

    /// Lodging is only fetched after the forecast clears the hazard policy
    pub fn requires_safety_check(&self) -> bool {
        matches!(self, Intent::LodgingWithSafetyCheck)
    }

    pub fn is_in_scope(&self) -> bool {
        !matches!(self, Intent::OutOfScope)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";

/// Rule-based intent classifier
pub struct IntentClassifier {
    weather: Option<Regex>,
    lodging: Option<Regex>,
    safety: Option<Regex>,
    location: Regex,
    location_stop: Regex,
    dates: Vec<Regex>,
}

impl IntentClassifier {
    /// Build a classifier from the configured term lists
    ///
    /// # Errors
    ///
    /// Returns an error if a term list cannot be compiled into a pattern.
    pub fn new(policy: &PolicyConfig) -> Result<Self, EngineError> {
        let location = Regex::new(
            r"\b(?i:in|near|around|for|at|to|(?:how|what)\s+about)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*(?:,\s*[A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*)*)",
        )
        .map_err(compile_error)?;

        let location_stop = Regex::new(&format!(r"(?i)\b(?:{}|{})\b", MONTHS, WEEKDAYS))
            .map_err(compile_error)?;

        let dates = [
            format!(r"(?i)\b(?:{})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?\b", MONTHS),
            format!(r"(?i)\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:{})\b", MONTHS),
            r"\b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b".to_string(),
            r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
            format!(r"(?i)\b(?:{})s?\b", WEEKDAYS),
            r"(?i)\b(?:today|tonight|tomorrow|this weekend|next weekend|this week|next week|next month)\b"
                .to_string(),
        ]
        .iter()
        .map(|p| Regex::new(p).map_err(compile_error))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            weather: term_pattern(&policy.weather_terms)?,
            lodging: term_pattern(&policy.lodging_terms)?,
            safety: term_pattern(&policy.safety_terms)?,
            location,
            location_stop,
            dates,
        })
    }

    /// Classify a single message
    ///
    /// Total: every input, including the empty string, maps to an intent.
    pub fn classify(&self, text: &str) -> Intent {
        let lodging = matches(&self.lodging, text);
        let weather = matches(&self.weather, text);

        let intent = if lodging
            && (weather
                || matches(&self.safety, text)
                || self.location_hint(text).is_some()
                || self.has_date(text))
        {
            Intent::LodgingWithSafetyCheck
        } else if lodging {
            Intent::LodgingQuery
        } else if weather {
            Intent::WeatherQuery
        } else {
            Intent::OutOfScope
        };

        tracing::debug!("Classified message as {}", intent);
        intent
    }

    /// Classify a message using the conversation so far
    ///
    /// A follow-up such as "how about Long Beach instead?" names a place but
    /// no domain terms. When the message alone is out of scope, mentions a
    /// location or date, and the latest agent turn was in scope, that turn's
    /// intent carries forward.
    pub fn classify_in_context(&self, text: &str, prior_turns: &[Turn]) -> Intent {
        let intent = self.classify(text);
        if intent.is_in_scope() {
            return intent;
        }

        if self.location_hint(text).is_none() && !self.has_date(text) {
            return intent;
        }

        let previous = prior_turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Agent)
            .and_then(|turn| turn.decision.as_ref())
            .map(|decision| decision.intent());

        match previous {
            Some(previous) if previous.is_in_scope() => {
                tracing::debug!("Carrying forward {} from previous turn", previous);
                previous
            }
            _ => intent,
        }
    }

    /// Extract a destination such as "LA, CA" or "Seattle, WA"
    ///
    /// Takes the first run of capitalised words after a locative preposition
    /// or a "how about" / "what about" follow-up, cut before any month or
    /// weekday name.
    pub fn location_hint(&self, text: &str) -> Option<String> {
        self.location.captures_iter(text).find_map(|caps| {
            let raw = caps.get(1)?.as_str();
            let cut = match self.location_stop.find(raw) {
                Some(stop) => &raw[..stop.start()],
                None => raw,
            };
            let hint = cut.trim_end_matches(|c: char| c == ',' || c == '\'' || c.is_whitespace());
            if hint.is_empty() {
                None
            } else {
                Some(hint.to_string())
            }
        })
    }

    /// Whether the text mentions a date or relative day
    pub fn has_date(&self, text: &str) -> bool {
        self.dates.iter().any(|d| d.is_match(text))
    }
}

fn matches(pattern: &Option<Regex>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|p| p.is_match(text))
}

/// Case-insensitive, word-prefix match over a term list
fn term_pattern(terms: &[String]) -> Result<Option<Regex>, EngineError> {
    let escaped: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();

    if escaped.is_empty() {
        return Ok(None);
    }

    Regex::new(&format!(r"(?i)\b(?:{})", escaped.join("|")))
        .map(Some)
        .map_err(compile_error)
}

fn compile_error(err: regex::Error) -> EngineError {
    EngineError::Config(format!("Invalid policy pattern: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(&PolicyConfig::default()).unwrap()
    }

    #[test]
    fn test_weather_only() {
        assert_eq!(
            classifier().classify("Tell me the weather in LA, CA"),
            Intent::WeatherQuery
        );
    }

    #[test]
    fn test_lodging_with_location_requires_safety_check() {
        assert_eq!(
            classifier().classify("Find a room in LA, CA, June 20-25, 2025, two adults"),
            Intent::LodgingWithSafetyCheck
        );
    }

    #[test]
    fn test_lodging_alone() {
        assert_eq!(
            classifier().classify("Can you suggest a cozy cabin?"),
            Intent::LodgingQuery
        );
    }

    #[test]
    fn test_out_of_scope() {
        assert_eq!(
            classifier().classify("What's the capital of France?"),
            Intent::OutOfScope
        );
        assert_eq!(classifier().classify(""), Intent::OutOfScope);
    }

    #[test]
    fn test_lodging_with_date_only() {
        assert_eq!(
            classifier().classify("any airbnb available this weekend?"),
            Intent::LodgingWithSafetyCheck
        );
    }

    #[test]
    fn test_location_hint_cuts_before_dates() {
        let c = classifier();
        assert_eq!(
            c.location_hint("Find a room in LA, CA, June 20-25, 2025, two adults"),
            Some("LA, CA".to_string())
        );
        assert_eq!(
            c.location_hint("Book a hotel in Seattle, WA for next Friday."),
            Some("Seattle, WA".to_string())
        );
        assert_eq!(
            c.location_hint("Okay, how about a hotel in Long Beach, CA instead?"),
            Some("Long Beach, CA".to_string())
        );
        assert_eq!(c.location_hint("a hotel in June"), None);
        assert_eq!(c.location_hint("what is the weather like"), None);
    }

    #[test]
    fn test_follow_up_names_a_place() {
        let c = classifier();
        assert_eq!(
            c.location_hint("how about Long Beach instead?"),
            Some("Long Beach".to_string())
        );
        assert_eq!(
            c.location_hint("What about Portland, OR?"),
            Some("Portland, OR".to_string())
        );
        assert_eq!(c.location_hint("how about Friday?"), None);
        assert_eq!(c.location_hint("how about a cheaper one"), None);
    }

    #[test]
    fn test_follow_up_carries_previous_intent() {
        let c = classifier();
        let decision = crate::conductor::Decision::new(crate::conductor::DecisionParts {
            intent: Intent::LodgingWithSafetyCheck,
            hazard: true,
            rationale: "The forecast mentions hazardous conditions (storm).".to_string(),
            weather: None,
            lodging: None,
            location_hint: Some("Seattle, WA".to_string()),
            policy_notes: Vec::new(),
            composed_text: "Lodging is on hold.".to_string(),
        })
        .unwrap();
        let prior = vec![
            Turn::user("Find a hotel in Seattle, WA this weekend"),
            Turn::agent(decision),
        ];

        assert_eq!(c.classify("how about Long Beach instead?"), Intent::OutOfScope);
        assert_eq!(
            c.classify_in_context("how about Long Beach instead?", &prior),
            Intent::LodgingWithSafetyCheck
        );
        assert_eq!(
            c.classify_in_context("how about a joke?", &prior),
            Intent::OutOfScope
        );
    }

    #[test]
    fn test_dates() {
        let c = classifier();
        assert!(c.has_date("June 20-25"));
        assert!(c.has_date("from 6/20 to 6/25"));
        assert!(c.has_date("arriving 2025-06-20"));
        assert!(c.has_date("next Friday"));
        assert!(c.has_date("tomorrow morning"));
        assert!(!c.has_date("two adults and a dog"));
    }

    #[test]
    fn test_empty_term_lists_never_match() {
        let policy = PolicyConfig {
            lodging_terms: Vec::new(),
            ..PolicyConfig::default()
        };
        let c = IntentClassifier::new(&policy).unwrap();
        assert_eq!(c.classify("Find a hotel in Seattle"), Intent::OutOfScope);
    }

    #[test]
    fn test_intent_wire_name() {
        let json = serde_json::to_string(&Intent::LodgingWithSafetyCheck).unwrap();
        assert_eq!(json, "\"LODGING_WITH_SAFETY_CHECK\"");
    }
}
