//! Time Series Types
//!
//! Interval series consumed and produced by formula evaluation. A series is
//! evaluable only when its intervals tile the period exactly at the declared
//! resolution (see [`TimeSeries::check_evaluable`]).

use crate::error::{ModelError, Result};
use crate::serde_helpers;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ModelError::malformed_timestamp(value, e.to_string()))
}

// ============================================================================
// Period
// ============================================================================

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let period = Self { start, end };
        period.check()?;
        Ok(period)
    }

    /// Reject empty or inverted periods
    pub fn check(&self) -> Result<()> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(ModelError::InvalidPeriod {
                start: self.start.to_rfc3339(),
                end: self.end.to_rfc3339(),
            })
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// True when `other` lies entirely inside this period
    pub fn covers(&self, other: &Period) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Non-empty intersection
    pub fn intersect(&self, other: &Period) -> Option<Period> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Period { start, end })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ============================================================================
// Resolution
// ============================================================================

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)W|(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?)$")
        .expect("duration pattern is a valid regular expression")
});

/// Fixed-length ISO-8601 duration (`PT15M`, `PT1H`, `P1D`, `P1W`)
///
/// Calendar units (years, months) have no fixed length and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    seconds: i64,
}

impl Resolution {
    /// Longest step a `Duration` can carry (`Duration::MAX` in whole seconds)
    pub const MAX_SECONDS: i64 = i64::MAX / 1_000;

    pub fn from_seconds(seconds: i64) -> Result<Self> {
        let reject = |reason: &str| {
            Err(ModelError::invalid_resolution(format!("{}s", seconds), reason))
        };
        if seconds <= 0 {
            return reject("resolution must be positive");
        }
        if seconds > Self::MAX_SECONDS {
            return reject("duration out of range");
        }
        Ok(Self { seconds })
    }

    pub fn minutes(minutes: i64) -> Result<Self> {
        let seconds = minutes.checked_mul(60).ok_or_else(|| {
            ModelError::invalid_resolution(format!("{}m", minutes), "duration out of range")
        })?;
        Self::from_seconds(seconds)
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn as_duration(&self) -> Duration {
        Duration::seconds(self.seconds)
    }

    /// Length of `steps` consecutive intervals
    pub fn span(&self, steps: usize) -> Duration {
        Duration::seconds(self.seconds * steps as i64)
    }

    /// True when a bucket of `coarser` is a whole number of these steps
    pub fn divides(&self, coarser: &Resolution) -> bool {
        coarser.seconds % self.seconds == 0
    }

    /// True when `at` lies on the grid starting at `origin`
    pub fn is_aligned(&self, origin: DateTime<Utc>, at: DateTime<Utc>) -> bool {
        (at - origin).num_seconds() % self.seconds == 0 && (at - origin).subsec_nanos() == 0
    }

    /// Number of whole steps in a period, if the period is a multiple
    pub fn steps_in(&self, period: &Period) -> Option<usize> {
        let total = period.duration();
        if total.subsec_nanos() != 0 || total.num_seconds() % self.seconds != 0 {
            return None;
        }
        usize::try_from(total.num_seconds() / self.seconds).ok()
    }
}

impl FromStr for Resolution {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = DURATION_PATTERN.captures(s).ok_or_else(|| {
            let upper = s.to_ascii_uppercase();
            let date_part = upper.split('T').next().unwrap_or_default();
            if date_part.contains('Y') || date_part.contains('M') {
                ModelError::invalid_resolution(s, "calendar units have no fixed length")
            } else {
                ModelError::invalid_resolution(s, "expected PnW or PnDTnHnMnS")
            }
        })?;

        let part = |idx: usize, unit: i64| -> Result<i64> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| n.checked_mul(unit))
                    .ok_or_else(|| ModelError::invalid_resolution(s, "component out of range")),
                None => Ok(0),
            }
        };

        let seconds = [
            part(1, 7 * 86_400)?,
            part(2, 86_400)?,
            part(3, 3_600)?,
            part(4, 60)?,
            part(5, 1)?,
        ]
        .into_iter()
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or_else(|| ModelError::invalid_resolution(s, "duration out of range"))?;

        if seconds == 0 {
            return Err(ModelError::invalid_resolution(s, "resolution must be positive"));
        }
        if seconds > Self::MAX_SECONDS {
            return Err(ModelError::invalid_resolution(s, "duration out of range"));
        }
        Ok(Self { seconds })
    }
}

impl TryFrom<String> for Resolution {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> String {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.seconds;
        if rest % (7 * 86_400) == 0 {
            return write!(f, "P{}W", rest / (7 * 86_400));
        }
        f.write_str("P")?;
        let days = rest / 86_400;
        rest %= 86_400;
        if days > 0 {
            write!(f, "{}D", days)?;
        }
        if rest == 0 {
            return Ok(());
        }
        f.write_str("T")?;
        for (unit, suffix) in [(3_600, 'H'), (60, 'M'), (1, 'S')] {
            let n = rest / unit;
            rest %= unit;
            if n > 0 {
                write!(f, "{}{}", n, suffix)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Intervals
// ============================================================================

/// Interval quality, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntervalQuality {
    #[serde(rename = "VALIDATED", alias = "validated", alias = "Gültige Daten")]
    Validated,
    #[serde(rename = "ESTIMATED", alias = "estimated")]
    Estimated,
    #[serde(rename = "MISSING", alias = "missing", alias = "Keine Daten")]
    Missing,
}

impl Default for IntervalQuality {
    fn default() -> Self {
        Self::Validated
    }
}

/// One interval of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub position: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(
        deserialize_with = "serde_helpers::deserialize_f64_flexible",
        serialize_with = "serde_helpers::serialize_f64_as_string"
    )]
    pub quantity: f64,
    #[serde(default)]
    pub quality: IntervalQuality,
}

// ============================================================================
// TimeSeries
// ============================================================================

/// Interval time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    #[serde(rename = "timeSeriesId")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_type: Option<String>,
    pub unit: String,
    pub resolution: Resolution,
    pub period: Period,
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

impl TimeSeries {
    /// Regular validated series starting at `start`, positions from 1
    pub fn from_values(
        id: impl Into<String>,
        unit: impl Into<String>,
        resolution: Resolution,
        start: DateTime<Utc>,
        values: &[f64],
    ) -> Self {
        let step = resolution.as_duration();
        let intervals: Vec<Interval> = values
            .iter()
            .enumerate()
            .map(|(i, &quantity)| {
                let from = start + resolution.span(i);
                Interval {
                    position: i as i64 + 1,
                    start: from,
                    end: from + step,
                    quantity,
                    quality: IntervalQuality::Validated,
                }
            })
            .collect();
        let end = start + resolution.span(values.len());
        Self {
            id: id.into(),
            market_location_id: None,
            network_location_id: None,
            meter_location_id: None,
            measurement_type: None,
            unit: unit.into(),
            resolution,
            period: Period { start, end },
            intervals,
        }
    }

    /// Location that owns the series, market before network
    pub fn owning_location_id(&self) -> Option<&str> {
        self.market_location_id
            .as_deref()
            .or(self.network_location_id.as_deref())
    }

    pub fn quantities(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| i.quantity).collect()
    }

    /// Verify the tiling invariant
    ///
    /// Positions strictly increase; every interval spans exactly one
    /// resolution step; intervals are contiguous and cover the period with
    /// neither gaps nor overlaps; quantities are finite.
    pub fn check_evaluable(&self) -> Result<()> {
        let fail = |reason: String| Err(ModelError::not_evaluable(&self.id, reason));

        if self.period.start >= self.period.end {
            return fail(format!("empty period {}", self.period));
        }
        let step = self.resolution.as_duration();
        let mut cursor = self.period.start;
        let mut last_position: Option<i64> = None;

        for interval in &self.intervals {
            if last_position.is_some_and(|p| interval.position <= p) {
                return fail(format!(
                    "position {} does not follow {}",
                    interval.position,
                    last_position.unwrap_or_default()
                ));
            }
            if interval.start != cursor {
                return fail(format!(
                    "interval {} starts at {}, expected {}",
                    interval.position,
                    interval.start.to_rfc3339(),
                    cursor.to_rfc3339()
                ));
            }
            if interval.end - interval.start != step {
                return fail(format!(
                    "interval {} does not span {}",
                    interval.position, self.resolution
                ));
            }
            if !interval.quantity.is_finite() {
                return fail(format!("interval {} has a non-finite quantity", interval.position));
            }
            last_position = Some(interval.position);
            cursor = interval.end;
        }

        if cursor != self.period.end {
            return fail(format!(
                "intervals end at {}, period ends at {}",
                cursor.to_rfc3339(),
                self.period.end.to_rfc3339()
            ));
        }
        Ok(())
    }

    /// Index of the interval starting at `at`, for an evaluable series
    pub fn index_at(&self, at: DateTime<Utc>) -> Option<usize> {
        if !self.period.contains(at) || !self.resolution.is_aligned(self.period.start, at) {
            return None;
        }
        let idx = (at - self.period.start).num_seconds() / self.resolution.seconds();
        usize::try_from(idx).ok().filter(|&i| i < self.intervals.len())
    }
}

// ============================================================================
// OutputSpec
// ============================================================================

/// Declared unit and resolution of a formula's output series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series_id: Option<String>,
    #[serde(alias = "outputUnit")]
    pub unit: String,
    #[serde(alias = "outputResolution")]
    pub resolution: Resolution,
}

impl OutputSpec {
    pub fn new(unit: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            time_series_id: None,
            unit: unit.into(),
            resolution,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.time_series_id = Some(id.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;
    use errors::{ErrorCode, FormelErrorTrait};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!("PT15M".parse::<Resolution>().unwrap().seconds(), 900);
        assert_eq!("PT1H".parse::<Resolution>().unwrap().seconds(), 3_600);
        assert_eq!("P1D".parse::<Resolution>().unwrap().seconds(), 86_400);
        assert_eq!("P1W".parse::<Resolution>().unwrap().seconds(), 604_800);
        assert_eq!("P1DT6H".parse::<Resolution>().unwrap().seconds(), 108_000);
        assert_eq!("PT90S".parse::<Resolution>().unwrap().seconds(), 90);
    }

    #[test]
    fn test_resolution_rejects_calendar_and_empty() {
        for bad in ["P1M", "P1Y", "P", "PT", "PT0M", "15M", "PT1.5H", ""] {
            let err = bad.parse::<Resolution>().unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::NotEvaluable, "{}", bad);
        }
        let err = "P1M".parse::<Resolution>().unwrap_err();
        assert!(err.to_string().contains("calendar"));
    }

    #[test]
    fn test_resolution_rejects_out_of_range() {
        let err = "PT9223372036854776S".parse::<Resolution>().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotEvaluable);
        assert!(err.to_string().contains("out of range"));

        assert!(Resolution::from_seconds(i64::MAX).is_err());
        assert!(Resolution::from_seconds(Resolution::MAX_SECONDS + 1).is_err());
        assert!(Resolution::minutes(i64::MAX).is_err());

        let widest = Resolution::from_seconds(Resolution::MAX_SECONDS).unwrap();
        assert_eq!(widest.as_duration().num_seconds(), Resolution::MAX_SECONDS);
        assert_eq!(Duration::MAX.num_seconds(), Resolution::MAX_SECONDS);
        assert!(serde_json::from_str::<Resolution>(r#""PT9223372036854776S""#).is_err());
    }

    #[test]
    fn test_resolution_display_is_canonical() {
        for (text, canonical) in [
            ("PT15M", "PT15M"),
            ("PT60M", "PT1H"),
            ("P7D", "P1W"),
            ("PT24H", "P1D"),
            ("P1DT6H", "P1DT6H"),
            ("PT90S", "PT1M30S"),
        ] {
            assert_eq!(text.parse::<Resolution>().unwrap().to_string(), canonical);
        }
    }

    #[test]
    fn test_resolution_divides_and_steps() {
        let quarter = Resolution::minutes(15).unwrap();
        let hour = Resolution::minutes(60).unwrap();
        assert!(quarter.divides(&hour));
        assert!(!hour.divides(&quarter));

        let day = Period::new(t0(), t0() + Duration::days(1)).unwrap();
        assert_eq!(quarter.steps_in(&day), Some(96));
        let odd = Period::new(t0(), t0() + Duration::minutes(20)).unwrap();
        assert_eq!(quarter.steps_in(&odd), None);
    }

    #[test]
    fn test_period_operations() {
        let a = Period::new(t0(), t0() + Duration::hours(2)).unwrap();
        let b = Period::new(t0() + Duration::hours(1), t0() + Duration::hours(3)).unwrap();
        let c = Period::new(t0() + Duration::hours(2), t0() + Duration::hours(3)).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(
            a.intersect(&b),
            Some(Period {
                start: t0() + Duration::hours(1),
                end: t0() + Duration::hours(2)
            })
        );
        assert_eq!(a.intersect(&c), None);
        assert!(a.contains(t0()));
        assert!(!a.contains(t0() + Duration::hours(2)));
        assert!(Period::new(t0(), t0()).is_err());
    }

    #[test]
    fn test_regular_series_is_evaluable() {
        let ts = TimeSeries::from_values(
            "lineA",
            "KWH",
            Resolution::minutes(15).unwrap(),
            t0(),
            &[10.0, 10.0, 10.0],
        );
        assert!(ts.check_evaluable().is_ok());
        assert_eq!(ts.period.end, t0() + Duration::minutes(45));
        assert_eq!(ts.index_at(t0() + Duration::minutes(30)), Some(2));
        assert_eq!(ts.index_at(t0() + Duration::minutes(31)), None);
        assert_eq!(ts.index_at(t0() + Duration::minutes(45)), None);
    }

    #[test]
    fn test_gap_is_not_evaluable() {
        let mut ts = TimeSeries::from_values(
            "gap",
            "KWH",
            Resolution::minutes(15).unwrap(),
            t0(),
            &[1.0, 2.0, 3.0],
        );
        ts.intervals.remove(1);
        let err = ts.check_evaluable().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotEvaluable);
    }

    #[test]
    fn test_positions_must_increase() {
        let mut ts = TimeSeries::from_values(
            "pos",
            "KWH",
            Resolution::minutes(15).unwrap(),
            t0(),
            &[1.0, 2.0],
        );
        ts.intervals[1].position = 1;
        assert!(ts.check_evaluable().is_err());
    }

    #[test]
    fn test_series_wire_json() {
        let raw = serde_json::json!({
            "timeSeriesId": "TS-MELO-3054",
            "marketLocationId": "12345678901",
            "meterLocationId": "DE00014545768S0000000000000003054",
            "measurementType": "CONSUMPTION",
            "unit": "KWH",
            "resolution": "PT15M",
            "period": { "start": "2024-06-01T00:00:00Z", "end": "2024-06-01T00:30:00Z" },
            "intervals": [
                { "position": 1, "start": "2024-06-01T00:00:00Z", "end": "2024-06-01T00:15:00Z",
                  "quantity": "100.000", "quality": "Gültige Daten" },
                { "position": 2, "start": "2024-06-01T00:15:00Z", "end": "2024-06-01T00:30:00Z",
                  "quantity": 101.5, "quality": "ESTIMATED" }
            ]
        });
        let ts: TimeSeries = serde_json::from_value(raw).unwrap();
        assert!(ts.check_evaluable().is_ok());
        assert_eq!(ts.quantities(), vec![100.0, 101.5]);
        assert_eq!(ts.intervals[0].quality, IntervalQuality::Validated);
        assert_eq!(ts.owning_location_id(), Some("12345678901"));

        let back = serde_json::to_value(&ts).unwrap();
        assert_eq!(back["intervals"][1]["quantity"], "101.5");
        assert_eq!(back["intervals"][1]["quality"], "ESTIMATED");
        assert_eq!(back["resolution"], "PT15M");
    }

    #[test]
    fn test_quality_order() {
        assert!(IntervalQuality::Validated < IntervalQuality::Estimated);
        assert!(IntervalQuality::Estimated < IntervalQuality::Missing);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("2024-06-01T02:00:00+02:00").unwrap(),
            t0()
        );
        let err = parse_timestamp("2024-06-01").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MalformedTimestamp);
    }
}
