//! Advisory signals that input looks scripted or pasted.
//!
//! Every heuristic is evaluated on its own and the flags are additive. Nothing
//! here rejects a submission; the flags travel with the evaluation for a
//! reviewer to weigh.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::keystroke::{EventKind, KeystrokeEvent};
use crate::time_series::SpeedSample;
use crate::util::{intervals, std_dev};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    PasteDetected,
    UniformTiming,
    ImpossibleSpeed,
    ExcessiveBackspaceRatio,
    CaretJumps,
    InputDropped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Inserts longer than this many characters count as a paste
    pub paste_threshold_chars: usize,
    /// Number of consecutive inter-keystroke intervals examined together
    pub uniform_window: usize,
    pub uniform_std_dev_ms: f64,
    pub max_wpm: f64,
    pub max_backspace_ratio: f64,
    pub min_events_for_ratio: usize,
    pub max_caret_jumps: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            paste_threshold_chars: 10,
            uniform_window: 20,
            uniform_std_dev_ms: 5.0,
            max_wpm: 200.0,
            max_backspace_ratio: 0.5,
            min_events_for_ratio: 10,
            max_caret_jumps: 10,
        }
    }
}

/// Run every heuristic over a finished session's log
pub fn detect_anomalies(
    events: &[KeystrokeEvent],
    dropped_inputs: usize,
    speed_curve: &[SpeedSample],
    config: &IntegrityConfig,
) -> BTreeSet<FlagType> {
    let checks = [
        (FlagType::PasteDetected, paste_detected(events, config)),
        (FlagType::UniformTiming, uniform_timing(events, config)),
        (FlagType::ImpossibleSpeed, impossible_speed(speed_curve, config)),
        (
            FlagType::ExcessiveBackspaceRatio,
            excessive_backspace_ratio(events, config),
        ),
        (FlagType::CaretJumps, caret_jumps(events) > config.max_caret_jumps),
        (FlagType::InputDropped, dropped_inputs > 0),
    ];

    let flags: BTreeSet<FlagType> = checks
        .into_iter()
        .filter_map(|(flag, hit)| hit.then_some(flag))
        .collect();

    if !flags.is_empty() {
        tracing::info!(?flags, events = events.len(), "integrity flags raised");
    }
    flags
}

pub fn paste_detected(events: &[KeystrokeEvent], config: &IntegrityConfig) -> bool {
    events
        .iter()
        .any(|e| e.kind == EventKind::Insert && e.char_len() > config.paste_threshold_chars)
}

/// A sustained run of near-identical gaps between inserts
pub fn uniform_timing(events: &[KeystrokeEvent], config: &IntegrityConfig) -> bool {
    if config.uniform_window == 0 {
        return false;
    }
    let stamps: Vec<u64> = events
        .iter()
        .filter(|e| e.kind == EventKind::Insert)
        .map(|e| e.timestamp_ms)
        .collect();
    let gaps = intervals(&stamps);

    gaps.windows(config.uniform_window)
        .any(|w| std_dev(w).is_some_and(|sd| sd < config.uniform_std_dev_ms))
}

pub fn impossible_speed(speed_curve: &[SpeedSample], config: &IntegrityConfig) -> bool {
    speed_curve.iter().any(|s| s.wpm > config.max_wpm)
}

pub fn excessive_backspace_ratio(events: &[KeystrokeEvent], config: &IntegrityConfig) -> bool {
    let edits = events.iter().filter(|e| e.changes_text()).count();
    if edits == 0 || edits < config.min_events_for_ratio {
        return false;
    }
    let deletes = events.iter().filter(|e| e.kind == EventKind::Delete).count();
    deletes as f64 / edits as f64 > config.max_backspace_ratio
}

/// Events whose caret is not where the previous event left it, give or take
/// one position
pub fn caret_jumps(events: &[KeystrokeEvent]) -> usize {
    let mut caret = 0usize;
    let mut jumps = 0;
    for event in events {
        if event.caret_position.abs_diff(caret) > 1 {
            jumps += 1;
        }
        caret = match event.kind {
            EventKind::Insert => event.caret_position + event.char_len(),
            EventKind::Delete | EventKind::Caret => event.caret_position,
        };
    }
    jumps
}
