use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::align::{align, AlignmentResult};
use crate::integrity::{detect_anomalies, FlagType, IntegrityConfig};
use crate::keystroke::KeystrokeEvent;
use crate::metrics::{compute_metrics, MetricsConfig};
use crate::time_series::SpeedSample;
use crate::util::round2;

/// Tunables for scoring and integrity checks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub metrics: MetricsConfig,
    pub integrity: IntegrityConfig,
}

/// Final scored outcome of one session. Computed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub wpm: f64,
    pub accuracy: f64,
    pub raw_keystrokes: usize,
    pub corrected_errors: usize,
    pub integrity_flags: BTreeSet<FlagType>,
    pub duration_seconds: f64,
    pub score: f64,
    pub extra_count: usize,
    pub consistency: f64,
    pub speed_curve: Vec<SpeedSample>,
}

impl EvaluationResult {
    pub fn is_flagged(&self) -> bool {
        !self.integrity_flags.is_empty()
    }
}

/// Accuracy-weighted net speed
pub fn score(wpm: f64, accuracy: f64) -> f64 {
    round2(wpm * accuracy / 100.0)
}

/// Everything a session needs to be scored
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub reference: &'a str,
    pub typed: &'a str,
    pub events: &'a [KeystrokeEvent],
    pub dropped_inputs: usize,
    pub duration_seconds: f64,
}

/// align, measure, run the integrity checks, and combine
pub fn evaluate(
    input: EvaluationInput<'_>,
    config: &EngineConfig,
) -> (AlignmentResult, EvaluationResult) {
    let alignment = align(input.reference, input.typed);
    let metrics = compute_metrics(
        input.events,
        input.reference,
        &alignment,
        input.duration_seconds,
        &config.metrics,
    );
    let integrity_flags = detect_anomalies(
        input.events,
        input.dropped_inputs,
        &metrics.speed_curve,
        &config.integrity,
    );

    let result = EvaluationResult {
        score: score(metrics.wpm, metrics.accuracy),
        wpm: metrics.wpm,
        accuracy: metrics.accuracy,
        raw_keystrokes: metrics.raw_keystrokes,
        corrected_errors: metrics.corrected_errors,
        integrity_flags,
        duration_seconds: input.duration_seconds,
        extra_count: alignment.extra_count(),
        consistency: metrics.consistency,
        speed_curve: metrics.speed_curve,
    };
    (alignment, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_weights_speed_by_accuracy() {
        assert_eq!(score(60.0, 100.0), 60.0);
        assert_eq!(score(60.0, 50.0), 30.0);
        assert_eq!(score(0.0, 100.0), 0.0);
    }

    #[test]
    fn test_evaluate_partial_text() {
        let events = vec![KeystrokeEvent::insert(500, 0, "hello")];
        let (alignment, result) = evaluate(
            EvaluationInput {
                reference: "hello world",
                typed: "hello",
                events: &events,
                dropped_inputs: 0,
                duration_seconds: 60.0,
            },
            &EngineConfig::default(),
        );

        assert_eq!(alignment.missing_count(), 6);
        assert!((result.accuracy - 5.0 / 11.0 * 100.0).abs() < 1e-9);
        assert!((result.wpm - 1.0).abs() < 1e-9);
        assert_eq!(result.duration_seconds, 60.0);
        assert_eq!(result.speed_curve.len(), 12);
        assert!(!result.is_flagged());
    }

    #[test]
    fn test_evaluation_wire_format() {
        let events = vec![KeystrokeEvent::insert(0, 0, "this is definitely pasted")];
        let (_, result) = evaluate(
            EvaluationInput {
                reference: "this is definitely pasted",
                typed: "this is definitely pasted",
                events: &events,
                dropped_inputs: 0,
                duration_seconds: 2.0,
            },
            &EngineConfig::default(),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["accuracy"], 100.0);
        assert!(json["integrityFlags"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("PASTE_DETECTED")));
        assert!(json.get("durationSeconds").is_some());
    }
}
