/// X (seconds) and Y (WPM) bounds for the speed chart. An empty curve falls
/// back to the test duration so the axes still make sense.
pub fn compute_chart_params(coords: &[(f64, f64)], duration_seconds: f64) -> (f64, f64) {
    let highest_wpm = coords.iter().map(|&(_, wpm)| wpm).fold(0.0, f64::max);

    let overall_duration = coords
        .last()
        .map_or(duration_seconds, |&(t, _)| t.max(duration_seconds))
        .max(1.0);

    (overall_duration, highest_wpm.round().max(1.0))
}

pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}

/// Seconds left, one decimal, as shown above the prompt
pub fn format_countdown(remaining_ms: u64) -> String {
    format!("{:.1}", remaining_ms as f64 / 1000.0)
}
