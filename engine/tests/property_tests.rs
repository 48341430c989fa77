use proptest::prelude::*;
use sdk::errors::{ErrorKind, SpecialistError};
use sdk::types::{ResultStatus, SpecialistKind, SpecialistResult};
use std::sync::Arc;
use waypoint_engine::conductor::{compose, ComposeInput, Plan};
use waypoint_engine::config::PolicyConfig;
use waypoint_engine::injection_detector::InjectionDetector;
use waypoint_engine::policy::{HazardAssessment, HazardPolicy, Intent, IntentClassifier};

fn classifier() -> IntentClassifier {
    IntentClassifier::new(&PolicyConfig::default()).unwrap()
}

fn hazard_policy() -> HazardPolicy {
    HazardPolicy::new(
        &PolicyConfig::default(),
        Arc::new(InjectionDetector::new().unwrap()),
    )
}

fn any_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![
        Just(Intent::WeatherQuery),
        Just(Intent::LodgingQuery),
        Just(Intent::LodgingWithSafetyCheck),
        Just(Intent::OutOfScope),
    ]
}

fn any_failure_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::InvalidRequest),
        Just(ErrorKind::BackendUnavailable),
        Just(ErrorKind::BackendError),
        Just(ErrorKind::TransportTimeout),
        Just(ErrorKind::TransportError),
        Just(ErrorKind::ProtocolError),
    ]
}

// Classification is total and stable
proptest! {
    #[test]
    fn test_classify_is_deterministic(text in any::<String>()) {
        let classifier = classifier();
        let first = classifier.classify(&text);
        prop_assert_eq!(first, classifier.classify(&text));
    }

    #[test]
    fn test_weather_terms_never_out_of_scope(
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
    ) {
        let text = format!("{} weather {}", prefix, suffix);
        prop_assert_ne!(classifier().classify(&text), Intent::OutOfScope);
    }
}

// Hazard evaluation is total, deterministic and fails closed
proptest! {
    #[test]
    fn test_evaluate_is_deterministic(payload in any::<String>()) {
        let policy = hazard_policy();
        let result = SpecialistResult::success(SpecialistKind::Weather, payload);
        prop_assert_eq!(policy.evaluate(&result), policy.evaluate(&result));
    }

    #[test]
    fn test_failed_forecast_is_hazardous(kind in any_failure_kind(), message in ".{0,60}") {
        let result = SpecialistResult::failed(
            SpecialistKind::Weather,
            SpecialistError::new(kind, message),
        );
        let assessment = hazard_policy().evaluate(&result);
        prop_assert!(assessment.hazard);
        prop_assert!(assessment.matched_terms.is_empty());
    }

    #[test]
    fn test_partial_or_cancelled_forecast_is_hazardous(payload in "[a-z ]{0,60}", partial in any::<bool>()) {
        let result = if partial {
            SpecialistResult::partial(SpecialistKind::Weather, payload)
        } else {
            SpecialistResult::cancelled(SpecialistKind::Weather)
        };
        prop_assert!(hazard_policy().evaluate(&result).hazard);
    }

    #[test]
    fn test_hazard_term_anywhere_blocks(
        prefix in "[a-z ,.]{0,40}",
        suffix in "[a-z ,.]{0,40}",
        upper in any::<bool>(),
    ) {
        let term = if upper { "FLOOD" } else { "flood" };
        let payload = format!("{}{}{}", prefix, term, suffix);
        let result = SpecialistResult::success(SpecialistKind::Weather, payload);
        let assessment = hazard_policy().evaluate(&result);
        prop_assert!(assessment.hazard);
        prop_assert!(assessment.matched_terms.iter().any(|t| t == "flood"));
    }
}

// Composition never pairs a hazard with lodging suggestions
proptest! {
    #[test]
    fn test_compose_never_recommends_lodging_under_hazard(
        intent in any_intent(),
        hazard in any::<bool>(),
        with_lodging in any::<bool>(),
        forecast in "[a-z ,]{1,40}",
    ) {
        let plan = Plan { intent, location: Some("LA, CA".to_string()) };
        let weather = SpecialistResult::success(SpecialistKind::Weather, forecast);
        let assessment = HazardAssessment {
            hazard,
            rationale: "checked".to_string(),
            matched_terms: Vec::new(),
        };
        let lodging = SpecialistResult::success(SpecialistKind::Lodging, "Harbor Inn");

        let input = ComposeInput {
            plan: &plan,
            weather: intent.needs_weather().then_some(&weather),
            assessment: intent.requires_safety_check().then_some(&assessment),
            lodging: with_lodging.then_some(&lodging),
            previous: None,
        };

        if let Ok(decision) = compose(&input) {
            prop_assert!(!(decision.hazard() && decision.lodging().is_some()));
            prop_assert!(!decision.composed_text().is_empty());
            prop_assert_eq!(decision.intent(), intent);

            // Same inputs, same reply
            let again = compose(&input).unwrap();
            prop_assert_eq!(again.composed_text(), decision.composed_text());
        }
    }

    #[test]
    fn test_non_success_weather_never_leaks_status(
        kind in any_failure_kind(),
        secret in "[a-z]{16,24}",
    ) {
        let plan = Plan { intent: Intent::WeatherQuery, location: None };
        let weather = SpecialistResult::failed(
            SpecialistKind::Weather,
            SpecialistError::new(kind, secret.clone()),
        );
        let input = ComposeInput {
            plan: &plan,
            weather: Some(&weather),
            assessment: None,
            lodging: None,
            previous: None,
        };

        let decision = compose(&input).unwrap();
        prop_assert_eq!(decision.weather().map(|w| w.status), Some(ResultStatus::Failed));
        prop_assert!(!decision.composed_text().contains(&secret));
    }
}

// Sanitizing is idempotent and strips control characters
proptest! {
    #[test]
    fn test_sanitize_is_idempotent(text in any::<String>()) {
        let detector = InjectionDetector::new().unwrap();
        let once = detector.clean(&text);
        prop_assert_eq!(detector.clean(&once), once);
    }

    #[test]
    fn test_sanitized_text_has_no_escapes(text in any::<String>()) {
        let detector = InjectionDetector::new().unwrap();
        let cleaned = detector.clean(&text);
        prop_assert!(!cleaned.contains('\x1b'));
        prop_assert!(cleaned.chars().all(|c| !c.is_control() || c == '\n' || c == '\t'));
    }
}
