use serde::{Deserialize, Serialize};

/// One point of the speed curve: local WPM for the bucket ending at `t` seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub t: f64,
    pub wpm: f64,
}

impl SpeedSample {
    pub fn new(t: f64, wpm: f64) -> Self {
        Self { t, wpm }
    }
}

impl From<(f64, f64)> for SpeedSample {
    fn from(v: (f64, f64)) -> Self {
        SpeedSample { t: v.0, wpm: v.1 }
    }
}

impl From<SpeedSample> for (f64, f64) {
    fn from(p: SpeedSample) -> Self {
        (p.t, p.wpm)
    }
}

/// Chart-ready coordinates for a curve
pub fn coords(samples: &[SpeedSample]) -> Vec<(f64, f64)> {
    samples.iter().copied().map(Into::into).collect()
}
