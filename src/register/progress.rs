//! Progress reporting and remaining-time estimation.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Smoothing factor of the per-slice time average.
pub const ETA_SMOOTHING: f64 = 0.5;

/// Emitted after every slice has been written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// 1-based index of the slice just written
    pub slice: usize,

    /// Number of slices in the run
    pub total: usize,

    /// `slice / total`, strictly increasing over a run
    pub fraction: f64,

    /// Shift applied to the slice, relative to the reference slice
    pub shift_x: i64,
    pub shift_y: i64,

    /// Path of the registered slice
    pub output: PathBuf,

    /// Estimated time until the run completes
    #[serde(serialize_with = "serialize_secs")]
    pub eta: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Exponential moving average of per-slice wall time.
#[derive(Debug, Clone, Default)]
pub struct EtaEstimator {
    average: Option<Duration>,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one slice's load + match + save time into the average.
    pub fn record(&mut self, elapsed: Duration) {
        self.average = Some(match self.average {
            None => elapsed,
            Some(avg) => Duration::from_secs_f64(
                ETA_SMOOTHING * elapsed.as_secs_f64() + (1.0 - ETA_SMOOTHING) * avg.as_secs_f64(),
            ),
        });
    }

    /// Current per-slice average, `None` before the first sample.
    pub fn average(&self) -> Option<Duration> {
        self.average
    }

    /// Time left for `remaining` slices; zero until a sample has been recorded.
    pub fn eta(&self, remaining: usize) -> Duration {
        self.average
            .map(|avg| avg.mul_f64(remaining as f64))
            .unwrap_or(Duration::ZERO)
    }
}

/// Render a duration as `H h M min S sec`, dropping leading zero units.
///
/// Seconds are rounded to the nearest whole second.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs_f64().round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{} h {} min {} sec", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{} min {} sec", minutes, seconds)
    } else {
        format!("{} sec", seconds)
    }
}
