//! Formula Locations
//!
//! A `FormulaLocation` is the aggregate root: one market or network location
//! and the ordered, non-overlapping time slices of its formula.

use crate::error::{ModelError, Result};
use crate::formula::CalculationFormula;
use crate::identifiers::{MarketLocationId, NetworkLocationId};
use crate::timeseries::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data quality declared for a time slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeSliceQuality {
    #[serde(rename = "Gültige Daten", alias = "valid")]
    Valid,
    #[serde(rename = "Keine Daten", alias = "no-data")]
    NoData,
}

/// Validity-bounded version of a location's formula
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationFormulaTimeSlice {
    pub id: i64,
    pub quality: TimeSliceQuality,
    /// Inclusive
    pub valid_from: DateTime<Utc>,
    /// Exclusive
    pub valid_to: DateTime<Utc>,
    pub formula: CalculationFormula,
}

impl CalculationFormulaTimeSlice {
    pub fn validity(&self) -> Period {
        Period {
            start: self.valid_from,
            end: self.valid_to,
        }
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.validity().contains(at)
    }
}

/// Market or network location a formula belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationId {
    Market(MarketLocationId),
    Network(NetworkLocationId),
}

impl LocationId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Market(id) => id.as_str(),
            Self::Network(id) => id.as_str(),
        }
    }

    /// Wire field name (`maloId` / `neloId`)
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Market(_) => "maloId",
            Self::Network(_) => "neloId",
        }
    }

    /// Classify a raw id by its structure
    pub fn parse(raw: &str) -> Option<Self> {
        MarketLocationId::parse(raw)
            .map(Self::Market)
            .or_else(|_| NetworkLocationId::parse(raw).map(Self::Network))
            .ok()
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check slice periods and mutual overlap; reports every defect
///
/// Slices are compared in `valid_from` order, so each overlapping pair is
/// reported once as `(earlier, later)`.
pub fn check_time_slices(slices: &[CalculationFormulaTimeSlice]) -> Vec<ModelError> {
    let mut errors = Vec::new();
    if slices.is_empty() {
        errors.push(ModelError::EmptyTimeSlices);
        return errors;
    }

    for slice in slices {
        if slice.valid_from >= slice.valid_to {
            errors.push(ModelError::InvalidTimeSlicePeriod {
                id: slice.id,
                from: slice.valid_from.to_rfc3339(),
                to: slice.valid_to.to_rfc3339(),
            });
        }
    }

    let periods: Vec<Period> = slices.iter().map(|s| s.validity()).collect();
    for (a, b) in overlapping_pairs(&periods) {
        errors.push(ModelError::OverlappingTimeSlice {
            first: slices[a].id,
            second: slices[b].id,
        });
    }
    errors
}

/// Index pairs `(earlier, later)` of intersecting periods
///
/// Empty or inverted periods never overlap anything.
pub fn overlapping_pairs(periods: &[Period]) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..periods.len())
        .filter(|&i| periods[i].start < periods[i].end)
        .collect();
    order.sort_by_key(|&i| periods[i].start);

    let mut pairs = Vec::new();
    for (n, &a) in order.iter().enumerate() {
        for &b in &order[n + 1..] {
            if periods[b].start >= periods[a].end {
                break;
            }
            pairs.push((a, b));
        }
    }
    pairs
}

/// Accepted formula location; immutable once constructed
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaLocation {
    location: LocationId,
    time_slices: Vec<CalculationFormulaTimeSlice>,
}

impl FormulaLocation {
    /// Build a location; slices are ordered by `valid_from`
    ///
    /// Fails with the first defect found by [`check_time_slices`].
    pub fn new(location: LocationId, mut time_slices: Vec<CalculationFormulaTimeSlice>) -> Result<Self> {
        if let Some(err) = check_time_slices(&time_slices).into_iter().next() {
            return Err(err);
        }
        time_slices.sort_by_key(|s| s.valid_from);
        Ok(Self {
            location,
            time_slices,
        })
    }

    pub fn location(&self) -> &LocationId {
        &self.location
    }

    pub fn time_slices(&self) -> &[CalculationFormulaTimeSlice] {
        &self.time_slices
    }

    pub fn time_slice(&self, id: i64) -> Option<&CalculationFormulaTimeSlice> {
        self.time_slices.iter().find(|s| s.id == id)
    }

    /// Slice valid at `at`
    pub fn slice_at(&self, at: DateTime<Utc>) -> Option<&CalculationFormulaTimeSlice> {
        self.time_slices.iter().find(|s| s.covers(at))
    }

    /// Slices whose validity intersects `period`, in order
    pub fn slices_overlapping<'a>(
        &'a self,
        period: &'a Period,
    ) -> impl Iterator<Item = &'a CalculationFormulaTimeSlice> + 'a {
        self.time_slices
            .iter()
            .filter(move |s| s.validity().overlaps(period))
    }

    /// Span from the earliest slice start to the latest slice end
    pub fn validity(&self) -> Option<Period> {
        let first = self.time_slices.first()?;
        let last = self.time_slices.last()?;
        Some(Period {
            start: first.valid_from,
            end: last.valid_to,
        })
    }
}
