use serde::{Deserialize, Serialize};

use crate::align::AlignmentResult;
use crate::keystroke::{EventKind, KeystrokeEvent};
use crate::time_series::SpeedSample;
use crate::util::std_dev;

/// One "word" is five characters by convention
pub const CHARS_PER_WORD: f64 = 5.0;

/// Narrowest speed-curve bucket accepted from configuration
pub const MIN_BUCKET_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Width of a speed-curve bucket
    pub bucket_seconds: f64,
}

impl MetricsConfig {
    /// Raise a bucket width below `MIN_BUCKET_SECONDS` (or not a number) to the minimum
    pub fn sanitized(self) -> Self {
        if self.bucket_seconds >= MIN_BUCKET_SECONDS {
            return self;
        }
        tracing::warn!(
            bucket_seconds = self.bucket_seconds,
            min = MIN_BUCKET_SECONDS,
            "speed-curve bucket too narrow; using minimum"
        );
        Self {
            bucket_seconds: MIN_BUCKET_SECONDS,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bucket_seconds: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub wpm: f64,
    pub accuracy: f64,
    pub raw_keystrokes: usize,
    pub corrected_errors: usize,
    pub speed_curve: Vec<SpeedSample>,
    /// Spread of the speed curve; lower is steadier
    pub consistency: f64,
}

/// Net words per minute: only correct characters count
pub fn wpm(correct_chars: usize, duration_seconds: f64) -> f64 {
    if duration_seconds <= 0.0 {
        return 0.0;
    }
    (correct_chars as f64 / CHARS_PER_WORD) / (duration_seconds / 60.0)
}

pub fn compute_metrics(
    events: &[KeystrokeEvent],
    reference: &str,
    alignment: &AlignmentResult,
    duration_seconds: f64,
    config: &MetricsConfig,
) -> Metrics {
    let speed_curve = speed_curve(events, duration_seconds, config.bucket_seconds);
    let wpms: Vec<f64> = speed_curve.iter().map(|s| s.wpm).collect();

    Metrics {
        wpm: wpm(alignment.correct_count(), duration_seconds),
        accuracy: alignment.accuracy(),
        raw_keystrokes: events.iter().filter(|e| e.changes_text()).count(),
        corrected_errors: corrected_errors(events, reference),
        consistency: std_dev(&wpms).unwrap_or(0.0),
        speed_curve,
    }
}

/// Local WPM per fixed-width bucket, covering the whole duration.
///
/// Gross rate: every inserted character counts, whether or not it was right.
/// Rates always use the nominal bucket width so a short trailing bucket is
/// never inflated.
pub fn speed_curve(
    events: &[KeystrokeEvent],
    duration_seconds: f64,
    bucket_seconds: f64,
) -> Vec<SpeedSample> {
    if duration_seconds <= 0.0 || bucket_seconds.is_nan() {
        return vec![];
    }
    let bucket_seconds = bucket_seconds.max(MIN_BUCKET_SECONDS);

    let bucket_ms = bucket_seconds * 1000.0;
    let buckets = (duration_seconds / bucket_seconds).ceil().max(1.0) as usize;
    let mut inserted = vec![0usize; buckets];

    for event in events.iter().filter(|e| e.kind == EventKind::Insert) {
        let idx = ((event.timestamp_ms as f64 / bucket_ms) as usize).min(buckets - 1);
        inserted[idx] += event.char_len();
    }

    let minutes = bucket_seconds / 60.0;
    inserted
        .into_iter()
        .enumerate()
        .map(|(idx, chars)| {
            let end = ((idx + 1) as f64 * bucket_seconds).min(duration_seconds);
            SpeedSample::new(end, (chars as f64 / CHARS_PER_WORD) / minutes)
        })
        .collect()
}

/// Deleted characters that did not match the reference where they stood
pub fn corrected_errors(events: &[KeystrokeEvent], reference: &str) -> usize {
    let reference: Vec<char> = reference.chars().collect();

    events
        .iter()
        .filter(|e| e.kind == EventKind::Delete)
        .flat_map(|e| {
            e.text
                .chars()
                .enumerate()
                .map(move |(offset, c)| (e.caret_position + offset, c))
        })
        .filter(|&(pos, c)| reference.get(pos) != Some(&c))
        .count()
}
