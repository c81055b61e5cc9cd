//! Built-in functions over grid signals
//!
//! A [`Signal`] is either one value per grid interval or a scalar that
//! broadcasts across the grid. Every function here is stateless; the output
//! quality of an interval is the worst quality of the samples it was computed
//! from.

use crate::error::{EvalError, Result};
use crate::grid::{Grid, Sample};
use errors::ErrorCode;
use formel_model::IntervalQuality;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Per-interval values or a broadcast scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Scalar(Sample),
    Series(Vec<Sample>),
}

impl Signal {
    pub fn constant(value: f64) -> Self {
        Signal::Scalar(Sample::validated(value))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Signal::Scalar(_))
    }

    /// Sample at interval `i` (scalars broadcast)
    pub fn at(&self, i: usize) -> Sample {
        match self {
            Signal::Scalar(s) => *s,
            Signal::Series(v) => v.get(i).copied().unwrap_or(Sample {
                value: 0.0,
                quality: IntervalQuality::Missing,
            }),
        }
    }

    /// Expand to one sample per grid interval
    pub fn into_samples(self, len: usize) -> Vec<Sample> {
        match self {
            Signal::Scalar(s) => vec![s; len],
            Signal::Series(v) => v,
        }
    }

    /// Apply `f` to every value, keeping qualities
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Signal {
        match self {
            Signal::Scalar(s) => Signal::Scalar(Sample::new(f(s.value), s.quality)),
            Signal::Series(v) => Signal::Series(
                v.iter()
                    .map(|s| Sample::new(f(s.value), s.quality))
                    .collect(),
            ),
        }
    }

    fn series_len(&self) -> Option<usize> {
        match self {
            Signal::Scalar(_) => None,
            Signal::Series(v) => Some(v.len()),
        }
    }
}

/// Combine two signals interval by interval
///
/// `f` returns the failure code of an interval, if any; series failures carry
/// the interval position.
pub fn try_combine<F>(a: &Signal, b: &Signal, f: F) -> Result<Signal>
where
    F: Fn(f64, f64) -> std::result::Result<f64, ErrorCode>,
{
    let fail = |code: ErrorCode, position: Option<i64>| {
        let message = match code {
            ErrorCode::DivisionByZero => "Division by zero".to_string(),
            other => format!("{} while combining values", other),
        };
        EvalError {
            code,
            position,
            message,
        }
    };

    match a.series_len().or(b.series_len()) {
        None => {
            let (x, y) = (a.at(0), b.at(0));
            let value = f(x.value, y.value).map_err(|code| fail(code, None))?;
            Ok(Signal::Scalar(Sample::new(value, x.quality.max(y.quality))))
        },
        Some(len) => {
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let (x, y) = (a.at(i), b.at(i));
                let value =
                    f(x.value, y.value).map_err(|code| fail(code, Some(Grid::position(i))))?;
                out.push(Sample::new(value, x.quality.max(y.quality)));
            }
            Ok(Signal::Series(out))
        },
    }
}

/// Infallible interval-wise combination
pub fn combine(a: &Signal, b: &Signal, f: impl Fn(f64, f64) -> f64) -> Signal {
    let join = |x: Sample, y: Sample| Sample::new(f(x.value, y.value), x.quality.max(y.quality));
    match a.series_len().or(b.series_len()) {
        None => Signal::Scalar(join(a.at(0), b.at(0))),
        Some(len) => Signal::Series((0..len).map(|i| join(a.at(i), b.at(i))).collect()),
    }
}

fn fold(signals: &[Signal], f: impl Fn(f64, f64) -> f64 + Copy) -> Option<Signal> {
    let (first, rest) = signals.split_first()?;
    Some(rest.iter().fold(first.clone(), |acc, s| combine(&acc, s, f)))
}

/// Sum of all signals
pub fn sum(signals: &[Signal]) -> Option<Signal> {
    fold(signals, |a, b| a + b)
}

/// Product of all signals
pub fn product(signals: &[Signal]) -> Option<Signal> {
    fold(signals, |a, b| a * b)
}

/// Left-to-right division; a zero divisor fails the interval
pub fn divide(signals: &[Signal]) -> Option<Result<Signal>> {
    let (first, rest) = signals.split_first()?;
    let mut acc = first.clone();
    for divisor in rest {
        acc = match try_combine(&acc, divisor, |a, b| {
            if b == 0.0 {
                Err(ErrorCode::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }) {
            Ok(next) => next,
            Err(e) => return Some(Err(e)),
        };
    }
    Some(Ok(acc))
}

/// Scale by a constant factor
pub fn scale(signal: &Signal, factor: f64) -> Signal {
    if factor == 1.0 {
        signal.clone()
    } else {
        signal.map(|v| v * factor)
    }
}

/// Absolute value
pub fn abs(signal: &Signal) -> Signal {
    signal.map(f64::abs)
}

/// Interval-wise maximum across signals
pub fn cross_max(signals: &[Signal]) -> Option<Signal> {
    fold(signals, f64::max)
}

/// Interval-wise minimum across signals
pub fn cross_min(signals: &[Signal]) -> Option<Signal> {
    fold(signals, f64::min)
}

/// `max(series - threshold, 0)`
pub fn portion_above(series: &Signal, threshold: &Signal) -> Signal {
    combine(series, threshold, |v, t| (v - t).max(0.0))
}

/// `max(threshold - series, 0)`
pub fn portion_below(series: &Signal, threshold: &Signal) -> Signal {
    combine(series, threshold, |v, t| (t - v).max(0.0))
}

/// 1.0 where `a > b`, else 0.0
pub fn greater_than(a: &Signal, b: &Signal) -> Signal {
    combine(a, b, |x, y| if x > y { 1.0 } else { 0.0 })
}

/// Comparison operator of a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim() {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "==" | "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn holds(&self, a: f64, b: f64) -> bool {
        match self {
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Eq => a == b,
            Self::Ne => a != b,
        }
    }
}

/// Evaluate a comparison; 1.0 where it holds, else 0.0
pub fn compare(a: &Signal, op: Comparison, b: &Signal) -> Signal {
    combine(a, b, |x, y| if op.holds(x, y) { 1.0 } else { 0.0 })
}

/// Pick `then` where the condition is non-zero, `otherwise` elsewhere
///
/// A branch that failed to evaluate is only an error if it is selected for
/// at least one interval.
pub fn select(
    condition: &Signal,
    then: Result<Signal>,
    otherwise: Result<Signal>,
    len: usize,
) -> Result<Signal> {
    let picks: Vec<bool> = match condition {
        Signal::Scalar(s) => vec![s.value != 0.0],
        Signal::Series(v) => v.iter().map(|s| s.value != 0.0).collect(),
    };
    let then = if picks.iter().any(|&p| p) {
        Some(then?)
    } else {
        None
    };
    let otherwise = if picks.iter().any(|&p| !p) {
        Some(otherwise?)
    } else {
        None
    };

    let choose = |i: usize, pick: bool| -> Sample {
        let branch = if pick { then.as_ref() } else { otherwise.as_ref() };
        let chosen = branch.map(|b| b.at(i)).unwrap_or(Sample {
            value: 0.0,
            quality: IntervalQuality::Missing,
        });
        Sample::new(chosen.value, chosen.quality.max(condition.at(i).quality))
    };

    let all_scalar = condition.is_scalar()
        && then.as_ref().map_or(true, Signal::is_scalar)
        && otherwise.as_ref().map_or(true, Signal::is_scalar);
    if all_scalar {
        return Ok(Signal::Scalar(choose(0, picks[0])));
    }

    Ok(Signal::Series(
        (0..len)
            .map(|i| {
                let pick = match condition {
                    Signal::Scalar(_) => picks[0],
                    Signal::Series(_) => picks[i],
                };
                choose(i, pick)
            })
            .collect(),
    ))
}

/// Round half away from zero on the decimal representation
///
/// ```
/// use formel_calc::builtin_functions::round_half_away;
///
/// assert_eq!(round_half_away(2.5, 0), 3.0);
/// assert_eq!(round_half_away(-2.5, 0), -3.0);
/// assert_eq!(round_half_away(2.675, 2), 2.68);
/// ```
pub fn round_half_away(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    match Decimal::from_str(&value.to_string()) {
        Ok(d) => d
            .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
            .unwrap_or(value),
        // Beyond Decimal range there are no fractional digits left to round
        Err(_) => value,
    }
}

/// Round every value to `decimals` places
pub fn round(signal: &Signal, decimals: u32) -> Signal {
    signal.map(|v| round_half_away(v, decimals))
}

/// Reduce over all intervals with `pick`
fn reduce(signal: &Signal, pick: impl Fn(f64, f64) -> f64) -> Signal {
    match signal {
        Signal::Scalar(s) => Signal::Scalar(*s),
        Signal::Series(v) => {
            let quality = v
                .iter()
                .map(|s| s.quality)
                .max()
                .unwrap_or(IntervalQuality::Missing);
            let value = v.iter().map(|s| s.value).reduce(&pick).unwrap_or(0.0);
            Signal::Scalar(Sample::new(value, quality))
        },
    }
}

/// Maximum over all intervals
pub fn interval_max(signal: &Signal) -> Signal {
    reduce(signal, f64::max)
}

/// Minimum over all intervals
pub fn interval_min(signal: &Signal) -> Signal {
    reduce(signal, f64::min)
}
