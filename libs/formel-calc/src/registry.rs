//! Formula Registry
//!
//! In-memory store of accepted formula locations. Every accepted submission
//! is appended to the history of its location; older submissions are never
//! modified, newer ones supersede them for the instants they cover.
//! Accepted responses are cached by transaction id so that a retried
//! submission gets the first answer without being validated again.

use crate::engine::FormulaEngine;
use crate::validation::{SubmissionResult, SubmissionStatus};
use chrono::{DateTime, Utc};
use errors::{ErrorCode, ErrorInfo};
use formel_model::wire::WireFormulaLocation;
use formel_model::{
    parse_timestamp, CalculationFormulaTimeSlice, FormulaLocation, LocationId, TransactionId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Caller metadata of a submission; opaque apart from its format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEnvelope {
    pub transaction_id: String,
    pub creation_date_time: String,
    /// Transaction being retried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_transaction_id: Option<String>,
}

impl SubmissionEnvelope {
    pub fn new(transaction_id: &TransactionId, creation_date_time: DateTime<Utc>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            creation_date_time: creation_date_time.to_rfc3339(),
            initial_transaction_id: None,
        }
    }

    pub fn retry_of(mut self, initial: &TransactionId) -> Self {
        self.initial_transaction_id = Some(initial.to_string());
        self
    }

    fn check(&self) -> Result<(TransactionId, DateTime<Utc>), Vec<ErrorInfo>> {
        let mut errors = Vec::new();
        let transaction_id = self
            .transaction_id
            .parse::<TransactionId>()
            .map_err(|e| errors.push(envelope_error("transactionId", e.to_string())))
            .ok();
        let created = parse_timestamp(&self.creation_date_time)
            .map_err(|e| errors.push(envelope_error("creationDateTime", e.to_string())))
            .ok();
        if let Some(initial) = &self.initial_transaction_id {
            if let Err(e) = initial.parse::<TransactionId>() {
                errors.push(envelope_error("initialTransactionId", e.to_string()));
            }
        }
        match (transaction_id, created) {
            (Some(id), Some(at)) if errors.is_empty() => Ok((id, at)),
            _ => Err(errors),
        }
    }
}

fn envelope_error(field: &str, message: String) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::InvalidEnvelope, message).at(field)
}

/// Response to a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub transaction_id: String,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_time: Option<DateTime<Utc>>,
    pub result: SubmissionResult,
    /// Served from the transaction cache
    #[serde(default)]
    pub replayed: bool,
}

/// One accepted submission of a location
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFormula {
    pub location: Arc<FormulaLocation>,
    pub transaction_id: TransactionId,
    pub creation_date_time: DateTime<Utc>,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaSummary {
    pub location_id: String,
    /// `maloId` or `neloId`
    pub location_type: String,
    pub time_slice_count: usize,
    pub transaction_id: String,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    history: HashMap<LocationId, Vec<StoredFormula>>,
    receipts: HashMap<String, SubmissionReceipt>,
}

/// In-memory formula registry
#[derive(Debug)]
pub struct FormulaRegistry {
    engine: Arc<FormulaEngine>,
    state: RwLock<RegistryState>,
}

impl FormulaRegistry {
    pub fn new(engine: Arc<FormulaEngine>) -> Self {
        Self {
            engine,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Submit a wire formula location under `envelope`
    ///
    /// A retry (`initialTransactionId`) or a repeated `transactionId` of an
    /// accepted submission returns the cached receipt.
    pub fn submit(&self, envelope: &SubmissionEnvelope, wire: &WireFormulaLocation) -> SubmissionReceipt {
        if let Some(cached) = cached(&self.state.read(), envelope) {
            return replay(envelope, cached);
        }

        let (transaction_id, creation_date_time) = match envelope.check() {
            Ok(checked) => checked,
            Err(errors) => {
                return SubmissionReceipt {
                    transaction_id: envelope.transaction_id.clone(),
                    status: SubmissionStatus::Rejected,
                    acceptance_time: None,
                    result: SubmissionResult {
                        status: SubmissionStatus::Rejected,
                        location_id: wire.malo_id.clone().or_else(|| wire.nelo_id.clone()),
                        location_errors: errors,
                        per_slice_results: Vec::new(),
                    },
                    replayed: false,
                };
            },
        };

        let validated = self.engine.submit_wire(wire);
        let Some(location) = validated.location else {
            return SubmissionReceipt {
                transaction_id: envelope.transaction_id.clone(),
                status: SubmissionStatus::Rejected,
                acceptance_time: None,
                result: validated.result,
                replayed: false,
            };
        };

        let accepted_at = Utc::now();
        let receipt = SubmissionReceipt {
            transaction_id: envelope.transaction_id.clone(),
            status: SubmissionStatus::Accepted,
            acceptance_time: Some(accepted_at),
            result: validated.result,
            replayed: false,
        };

        let location_id = location.location().clone();
        let mut state = self.state.write();
        // a concurrent submit of the same transaction may have stored it meanwhile
        if let Some(cached) = cached(&state, envelope) {
            return replay(envelope, cached);
        }
        let history = state.history.entry(location_id.clone()).or_default();
        history.push(StoredFormula {
            location: Arc::new(location),
            transaction_id,
            creation_date_time,
            accepted_at,
        });
        info!(
            location = %location_id,
            version = history.len(),
            transaction = %envelope.transaction_id,
            "Formula location stored"
        );
        state
            .receipts
            .insert(envelope.transaction_id.clone(), receipt.clone());
        receipt
    }

    /// Slice valid at `at`, from the newest submission covering it
    pub fn resolve(&self, location_id: &LocationId, at: DateTime<Utc>) -> Option<CalculationFormulaTimeSlice> {
        let state = self.state.read();
        state
            .history
            .get(location_id)?
            .iter()
            .rev()
            .find_map(|stored| stored.location.slice_at(at).cloned())
    }

    /// Latest accepted submission
    pub fn get(&self, location_id: &LocationId) -> Option<StoredFormula> {
        self.state
            .read()
            .history
            .get(location_id)
            .and_then(|h| h.last().cloned())
    }

    /// All accepted submissions, oldest first
    pub fn history(&self, location_id: &LocationId) -> Vec<StoredFormula> {
        self.state
            .read()
            .history
            .get(location_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Summary of the latest submission per location, ordered by location id
    pub fn list(&self) -> Vec<FormulaSummary> {
        let state = self.state.read();
        let mut summaries: Vec<FormulaSummary> = state
            .history
            .iter()
            .filter_map(|(id, history)| {
                let latest = history.last()?;
                Some(FormulaSummary {
                    location_id: id.to_string(),
                    location_type: id.field_name().to_string(),
                    time_slice_count: latest.location.time_slices().len(),
                    transaction_id: latest.transaction_id.to_string(),
                    accepted_at: latest.accepted_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| a.location_id.cmp(&b.location_id));
        summaries
    }
}

fn cached(state: &RegistryState, envelope: &SubmissionEnvelope) -> Option<SubmissionReceipt> {
    envelope
        .initial_transaction_id
        .as_ref()
        .and_then(|id| state.receipts.get(id))
        .or_else(|| state.receipts.get(&envelope.transaction_id))
        .cloned()
}

fn replay(envelope: &SubmissionEnvelope, cached: SubmissionReceipt) -> SubmissionReceipt {
    debug!(transaction = %envelope.transaction_id, "Replaying cached submission");
    SubmissionReceipt {
        replayed: true,
        ..cached
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn wire(from: &str, to: &str, constant: &str) -> WireFormulaLocation {
        serde_json::from_value(json!({
            "maloId": "57685676748",
            "calculationFormulaTimeSlices": [{
                "timeSliceId": 1,
                "timeSliceQuality": "Gültige Daten",
                "periodOfUseFrom": from,
                "periodOfUseTo": to,
                "calculationFormula": { "operand": { "const": constant } }
            }]
        }))
        .unwrap()
    }

    fn envelope() -> SubmissionEnvelope {
        SubmissionEnvelope::new(&TransactionId::new_v4(), Utc::now())
    }

    fn malo() -> LocationId {
        LocationId::parse("57685676748").unwrap()
    }

    fn registry() -> FormulaRegistry {
        FormulaRegistry::new(Arc::new(FormulaEngine::new()))
    }

    #[test]
    fn test_supersession() {
        let registry = registry();
        let first = registry.submit(&envelope(), &wire("2024-01-01T00:00:00Z", "2025-01-01T00:00:00Z", "1"));
        assert_eq!(first.status, SubmissionStatus::Accepted);
        let second = registry.submit(&envelope(), &wire("2024-06-01T00:00:00Z", "2025-01-01T00:00:00Z", "2"));
        assert_eq!(second.status, SubmissionStatus::Accepted);

        let at = |m: u32| Utc.with_ymd_and_hms(2024, m, 1, 12, 0, 0).unwrap();
        let resolved = registry.resolve(&malo(), at(3)).unwrap();
        assert_eq!(resolved.formula.to_string(), "1");
        let resolved = registry.resolve(&malo(), at(8)).unwrap();
        assert_eq!(resolved.formula.to_string(), "2");
        assert!(registry
            .resolve(&malo(), Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
            .is_none());

        assert_eq!(registry.history(&malo()).len(), 2);
        let summaries = registry.list();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].location_type, "maloId");
        assert_eq!(summaries[0].transaction_id, second.transaction_id);
    }

    #[test]
    fn test_retry_replays_cached_receipt() {
        let registry = registry();
        let first = envelope();
        let accepted = registry.submit(&first, &wire("2024-01-01T00:00:00Z", "2025-01-01T00:00:00Z", "1"));
        assert!(!accepted.replayed);

        let initial: TransactionId = first.transaction_id.parse().unwrap();
        let retry = envelope().retry_of(&initial);
        // Body is ignored on replay
        let replayed = registry.submit(&retry, &WireFormulaLocation::default());
        assert!(replayed.replayed);
        assert_eq!(replayed.status, SubmissionStatus::Accepted);
        assert_eq!(replayed.transaction_id, first.transaction_id);
        assert_eq!(registry.history(&malo()).len(), 1);

        let repeated = registry.submit(&first, &WireFormulaLocation::default());
        assert!(repeated.replayed);
    }

    #[test]
    fn test_concurrent_same_transaction_stored_once() {
        let registry = registry();
        let envelope = envelope();
        let location = wire("2024-01-01T00:00:00Z", "2025-01-01T00:00:00Z", "1");

        let receipts: Vec<SubmissionReceipt> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.submit(&envelope, &location)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(receipts.iter().all(|r| r.status == SubmissionStatus::Accepted));
        assert_eq!(receipts.iter().filter(|r| !r.replayed).count(), 1);
        assert_eq!(registry.history(&malo()).len(), 1);
    }

    #[test]
    fn test_rejected_submission_not_stored() {
        let registry = registry();
        let receipt = registry.submit(&envelope(), &wire("2024-01-01T00:00:00Z", "2023-01-01T00:00:00Z", "1"));
        assert_eq!(receipt.status, SubmissionStatus::Rejected);
        assert!(receipt.acceptance_time.is_none());
        assert!(registry.get(&malo()).is_none());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_invalid_envelope() {
        let registry = registry();
        let envelope = SubmissionEnvelope {
            transaction_id: "not-a-uuid".to_string(),
            creation_date_time: "yesterday".to_string(),
            initial_transaction_id: None,
        };
        let receipt = registry.submit(&envelope, &wire("2024-01-01T00:00:00Z", "2025-01-01T00:00:00Z", "1"));
        assert_eq!(receipt.status, SubmissionStatus::Rejected);
        let fields: Vec<Option<&str>> = receipt
            .result
            .location_errors
            .iter()
            .map(|e| e.path.as_deref())
            .collect();
        assert_eq!(fields, vec![Some("transactionId"), Some("creationDateTime")]);
        assert!(receipt
            .result
            .location_errors
            .iter()
            .all(|e| e.code == ErrorCode::InvalidEnvelope));
    }
}
