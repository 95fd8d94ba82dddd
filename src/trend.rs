//! Least-squares trend of a feature against time within one window.
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// One measurement: hours since admission and the measured value.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub offset: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(offset: f64, value: f64) -> Self {
        Self { offset, value }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((offset, value): (f64, f64)) -> Self {
        Self { offset, value }
    }
}

/// Mean of `f` over `samples`, `0` when there are none.
pub fn mean(samples: &[Sample], f: impl Fn(&Sample) -> f64) -> f64 {
    if samples.is_empty() {
        return 0.;
    }
    samples.iter().map(f).sum::<f64>() / samples.len() as f64
}

/// Slope of value against offset, fitted with ordinary least squares.
///
/// Zero or one samples have no slope and give `0`. If every sample shares the same offset the
/// slope is undefined and `DegenerateWindow` is returned.
pub fn try_trend(samples: &[Sample]) -> Result<f64, PipelineError> {
    let Some(first) = samples.first() else {
        return Ok(0.);
    };
    if samples.len() == 1 {
        return Ok(0.);
    }
    if samples.iter().all(|s| s.offset == first.offset) {
        return Err(PipelineError::DegenerateWindow {
            count: samples.len(),
            offset: first.offset,
        });
    }

    let mean_x = mean(samples, |s| s.offset);
    let mean_y = mean(samples, |s| s.value);
    let mean_xy = mean(samples, |s| s.offset * s.value);
    let mean_xx = mean(samples, |s| s.offset * s.offset);
    let denominator = mean_x * mean_x - mean_xx;
    if denominator == 0. {
        return Err(PipelineError::DegenerateWindow {
            count: samples.len(),
            offset: first.offset,
        });
    }
    Ok((mean_x * mean_y - mean_xy) / denominator)
}

/// Like `try_trend`, but a degenerate window has a trend of `0`.
pub fn trend(samples: &[Sample]) -> f64 {
    try_trend(samples).unwrap_or(0.)
}
