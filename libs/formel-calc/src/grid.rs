//! Output grid and input alignment
//!
//! Every evaluation runs on a grid of equal intervals covering the requested
//! period at the declared output resolution. Inputs are joined onto that grid
//! before any operator runs: finer inputs are summed into each output bucket,
//! coarser inputs are rejected.

use crate::error::{EvalError, Result};
use chrono::{DateTime, Utc};
use formel_model::{Interval, IntervalQuality, Period, Resolution, TimeSeries};

/// One value on the grid together with its quality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub quality: IntervalQuality,
}

impl Sample {
    pub fn new(value: f64, quality: IntervalQuality) -> Self {
        Self { value, quality }
    }

    pub fn validated(value: f64) -> Self {
        Self::new(value, IntervalQuality::Validated)
    }
}

/// Equal-width intervals covering a period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    period: Period,
    resolution: Resolution,
    len: usize,
}

impl Grid {
    /// Grid for `period` at `resolution`; the period must be a whole number of steps
    pub fn new(period: Period, resolution: Resolution) -> Result<Self> {
        period.check()?;
        let len = resolution.steps_in(&period).ok_or_else(|| {
            EvalError::misaligned(format!(
                "Period {} is not a whole number of {} intervals",
                period, resolution
            ))
        })?;
        Ok(Self {
            period,
            resolution,
            len,
        })
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn start_of(&self, index: usize) -> DateTime<Utc> {
        self.period.start + self.resolution.span(index)
    }

    /// 1-based interval position
    pub fn position(index: usize) -> i64 {
        index as i64 + 1
    }

    /// True when `at` is an interval boundary of this grid
    pub fn is_boundary(&self, at: DateTime<Utc>) -> bool {
        self.period.start <= at
            && at <= self.period.end
            && self.resolution.is_aligned(self.period.start, at)
    }

    /// Intervals carrying the given samples
    pub fn intervals(&self, samples: &[Sample]) -> Vec<Interval> {
        let step = self.resolution.as_duration();
        samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let start = self.start_of(i);
                Interval {
                    position: Self::position(i),
                    start,
                    end: start + step,
                    quantity: s.value,
                    quality: s.quality,
                }
            })
            .collect()
    }
}

/// Join one input series onto the grid
///
/// The series must be evaluable, at the grid resolution or a finer one that
/// divides it, phase-aligned with the grid, and cover the whole grid period.
/// Finer intervals are summed per bucket; bucket quality is the worst quality
/// of its contributing intervals.
pub fn align(series: &TimeSeries, grid: &Grid) -> Result<Vec<Sample>> {
    series.check_evaluable()?;

    let input = series.resolution;
    let output = grid.resolution();
    if input > output {
        return Err(EvalError::misaligned(format!(
            "Input '{}' at {} is coarser than the output resolution {}",
            series.id, input, output
        )));
    }
    if !input.divides(&output) {
        return Err(EvalError::misaligned(format!(
            "Input '{}' at {} does not divide the output resolution {}",
            series.id, input, output
        )));
    }
    if !input.is_aligned(series.period.start, grid.period().start) {
        return Err(EvalError::misaligned(format!(
            "Input '{}' intervals are not aligned with the output grid",
            series.id
        )));
    }
    if !series.period.covers(grid.period()) {
        return Err(EvalError::incomplete_input(format!(
            "Input '{}' covers {}, evaluation needs {}",
            series.id,
            series.period,
            grid.period()
        )));
    }

    let ratio = (output.seconds() / input.seconds()) as usize;
    let mut samples = Vec::with_capacity(grid.len());
    for i in 0..grid.len() {
        let at = grid.start_of(i);
        let first = series.index_at(at).ok_or_else(|| {
            EvalError::incomplete_input(format!(
                "Input '{}' has no interval at {}",
                series.id,
                at.to_rfc3339()
            ))
            .at(Grid::position(i))
        })?;
        let bucket = series.intervals.get(first..first + ratio).ok_or_else(|| {
            EvalError::incomplete_input(format!(
                "Input '{}' ends inside the interval starting at {}",
                series.id,
                at.to_rfc3339()
            ))
            .at(Grid::position(i))
        })?;
        let value: f64 = bucket.iter().map(|iv| iv.quantity).sum();
        let quality = bucket
            .iter()
            .map(|iv| iv.quality)
            .max()
            .unwrap_or(IntervalQuality::Missing);
        samples.push(Sample::new(value, quality));
    }
    Ok(samples)
}
