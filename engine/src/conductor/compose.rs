//! Response composition
//!
//! Builds the single reply for a turn from the plan, the (already
//! sanitized) specialist results and the hazard assessment. Output is
//! deterministic: no timestamps, ids or transport details appear in it, so
//! the same inputs always produce the same text.

use sdk::errors::ErrorExt;
use sdk::types::{ResultStatus, SpecialistResult};

use super::types::{Decision, DecisionError, DecisionParts, Plan};
use crate::policy::{HazardAssessment, Intent};

pub const BLOCKED_TEXT: &str = "Because the forecast includes hazardous conditions, I'm pausing \
lodging recommendations. Consider alternate dates or destinations.";

pub const OUT_OF_SCOPE_TEXT: &str = "I can help with weather forecasts and places to stay, and I \
check the forecast for hazards before recommending lodging. Try asking about the weather or \
lodging for a destination.";

/// Everything composition needs for one turn
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    pub plan: &'a Plan,
    pub weather: Option<&'a SpecialistResult>,
    pub assessment: Option<&'a HazardAssessment>,
    pub lodging: Option<&'a SpecialistResult>,
    /// Decision of the previous agent turn in this conversation
    pub previous: Option<&'a Decision>,
}

/// Compose the reply and the decision that explains it
pub fn compose(input: &ComposeInput<'_>) -> Result<Decision, DecisionError> {
    let intent = input.plan.intent;
    if intent == Intent::OutOfScope {
        return Ok(Decision::out_of_scope(OUT_OF_SCOPE_TEXT));
    }

    let hazard = intent.requires_safety_check() && input.assessment.map_or(true, |a| a.hazard);
    let rationale = rationale(input);
    let policy_notes = policy_notes(input, hazard);

    let mut sections: Vec<String> = Vec::new();
    sections.push(policy_check_line(intent).to_string());

    if let Some(weather) = input.weather {
        sections.push(weather_section(weather, input.plan.location.as_deref()));
    }

    if hazard {
        sections.push(format!("{}\n{}", BLOCKED_TEXT, rationale));
    }

    if let Some(lodging) = input.lodging {
        sections.push(lodging_section(lodging));
    }

    if let Some(note) = recovery_note(input, hazard) {
        sections.push(note);
    }

    if let Some(summary) = summary_line(input, hazard) {
        sections.push(summary.to_string());
    }

    if !policy_notes.is_empty() {
        let lines: Vec<String> = policy_notes.iter().map(|n| format!("- {}", n)).collect();
        sections.push(format!("Policy summary:\n{}", lines.join("\n")));
    }

    Decision::new(DecisionParts {
        intent,
        hazard,
        rationale,
        weather: input.weather.cloned(),
        lodging: input.lodging.cloned(),
        location_hint: input.plan.location.clone(),
        policy_notes,
        composed_text: sections.join("\n\n"),
    })
}

fn policy_check_line(intent: Intent) -> &'static str {
    match intent {
        Intent::LodgingWithSafetyCheck => {
            "Policy check: I'll review the weather before sharing lodging ideas."
        }
        Intent::WeatherQuery => "Policy check: looping in the weather specialist for you.",
        Intent::LodgingQuery => {
            "Policy check: no destination or dates were given, so I'm going straight to lodging ideas."
        }
        Intent::OutOfScope => "",
    }
}

fn rationale(input: &ComposeInput<'_>) -> String {
    match input.plan.intent {
        Intent::LodgingWithSafetyCheck => input
            .assessment
            .map(|a| a.rationale.clone())
            .unwrap_or_else(|| {
                "The forecast was not evaluated, so conditions are treated as hazardous."
                    .to_string()
            }),
        Intent::WeatherQuery => "Weather-only request; the lodging gate does not apply.".to_string(),
        Intent::LodgingQuery => {
            "No destination or dates were given, so no weather review was required.".to_string()
        }
        Intent::OutOfScope => "The request is outside the weather and lodging domains.".to_string(),
    }
}

fn policy_notes(input: &ComposeInput<'_>, hazard: bool) -> Vec<String> {
    let mut notes = Vec::new();
    match input.plan.intent {
        Intent::LodgingWithSafetyCheck => {
            notes.push("Lodging plans require a fresh weather review before sharing listings.");
            let fail_closed = input
                .assessment
                .map_or(true, |a| a.hazard && a.matched_terms.is_empty());
            if hazard && fail_closed {
                notes.push("Forecast unavailable, so lodging guidance is paused.");
            } else if hazard {
                notes.push("Hazardous conditions detected, pausing lodging guidance.");
            } else {
                notes.push("Weather looks acceptable, gathering lodging suggestions.");
            }
        }
        Intent::WeatherQuery => {
            notes.push("Provide a concise weather outlook from the specialist.");
        }
        Intent::LodgingQuery => {
            notes.push("No destination or dates given, so the weather review was skipped.");
        }
        Intent::OutOfScope => {}
    }
    notes.into_iter().map(str::to_string).collect()
}

fn weather_section(weather: &SpecialistResult, location: Option<&str>) -> String {
    let place = location.map(|l| format!(" for {}", l)).unwrap_or_default();
    let payload = weather.payload.trim();
    if weather.status == ResultStatus::Success && !payload.is_empty() {
        format!("Weather outlook{}:\n{}", place, payload)
    } else {
        format!(
            "I could not retrieve a weather update{}. {}.",
            place,
            failure_hint(weather)
        )
    }
}

fn lodging_section(lodging: &SpecialistResult) -> String {
    let payload = lodging.payload.trim();
    if lodging.status == ResultStatus::Success && !payload.is_empty() {
        format!("Lodging ideas:\n{}", payload)
    } else {
        format!(
            "Sorry, I couldn't get lodging suggestions right now. {}. Please try again in a moment.",
            failure_hint(lodging)
        )
    }
}

/// User-safe reason for an unusable result; never echoes peer text
fn failure_hint(result: &SpecialistResult) -> &str {
    if let Some(error) = &result.error {
        return error.user_hint();
    }
    match result.status {
        ResultStatus::Cancelled => "The request was cancelled",
        ResultStatus::Partial => "The response was incomplete",
        ResultStatus::Success | ResultStatus::Failed => "The response was empty",
    }
}

fn recovery_note(input: &ComposeInput<'_>, hazard: bool) -> Option<String> {
    let previous = input.previous?;
    if hazard
        || input.plan.intent != Intent::LodgingWithSafetyCheck
        || previous.intent() != Intent::LodgingWithSafetyCheck
        || !previous.hazard()
    {
        return None;
    }

    let note = match (previous.location_hint(), input.plan.location.as_deref()) {
        (Some(before), Some(now)) if before != now => format!(
            "Earlier, lodging for {} was paused because of hazardous weather. {} looks clear.",
            before, now
        ),
        (Some(before), _) => format!(
            "Earlier, lodging for {} was paused because of hazardous weather. The latest forecast looks clear.",
            before
        ),
        (None, _) => "Earlier, lodging was paused because of hazardous weather. This forecast looks clear."
            .to_string(),
    };
    Some(note)
}

fn summary_line(input: &ComposeInput<'_>, hazard: bool) -> Option<&'static str> {
    if hazard {
        return None;
    }
    match input.plan.intent {
        Intent::LodgingWithSafetyCheck if input.lodging.is_some_and(|l| l.is_success()) => {
            Some("Here are some lodging ideas that align with the current forecast.")
        }
        Intent::LodgingQuery if input.lodging.is_some_and(|l| l.is_success()) => {
            Some("Share a destination and dates and I'll check the forecast before you book.")
        }
        Intent::WeatherQuery if input.weather.is_some_and(|w| w.is_success()) => {
            Some("Let me know if you need help planning activities around this weather outlook.")
        }
        _ => None,
    }
}
