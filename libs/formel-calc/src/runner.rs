//! Calculation Runner
//!
//! Bounded worker pool for independent calculation requests. Each request is
//! validated and evaluated on the blocking pool under a semaphore permit; a
//! failing request never affects another one.

use crate::engine::FormulaEngine;
use crate::error::EvalError;
use chrono::{DateTime, Utc};
use errors::{ErrorCode, ErrorInfo, FormelErrorTrait};
use formel_model::wire::WireFormulaLocation;
use formel_model::{OutputSpec, Period, TimeSeries};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// One calculation: a location (or one of its slices) over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    pub calculation_id: String,
    pub formula_location: WireFormulaLocation,
    /// Restrict evaluation to one time slice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slice_id: Option<i64>,
    #[serde(default)]
    pub inputs: HashMap<String, TimeSeries>,
    pub period: Period,
    pub output: OutputSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub calculation_id: String,
    pub status: CalculationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TimeSeries>,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    pub completed_at: DateTime<Utc>,
}

impl CalculationResult {
    fn completed(calculation_id: String, output: TimeSeries) -> Self {
        Self {
            calculation_id,
            status: CalculationStatus::Completed,
            output: Some(output),
            errors: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    fn failed(calculation_id: String, errors: Vec<ErrorInfo>) -> Self {
        Self {
            calculation_id,
            status: CalculationStatus::Failed,
            output: None,
            errors,
            completed_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CalculationStatus::Completed
    }
}

/// Bounded calculation runner
#[derive(Debug, Clone)]
pub struct CalculationRunner {
    engine: Arc<FormulaEngine>,
    semaphore: Arc<Semaphore>,
}

impl CalculationRunner {
    pub fn new(engine: Arc<FormulaEngine>) -> Self {
        let permits = engine.config().max_concurrent_calculations.max(1);
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn engine(&self) -> &FormulaEngine {
        &self.engine
    }

    /// Validate and evaluate one request on the calling thread
    pub fn run(&self, request: &CalculationRequest) -> CalculationResult {
        execute(&self.engine, request)
    }

    /// Run all requests concurrently; results are ordered by calculation id
    pub async fn run_batch(&self, requests: Vec<CalculationRequest>) -> Vec<CalculationResult> {
        let start = Instant::now();
        let count = requests.len();

        let tasks = requests.into_iter().map(|request| {
            let semaphore = self.semaphore.clone();
            let engine = self.engine.clone();
            async move {
                let calculation_id = request.calculation_id.clone();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return CalculationResult::failed(
                            calculation_id,
                            vec![ErrorInfo::new(ErrorCode::NotEvaluable, e.to_string())],
                        );
                    },
                };
                match tokio::task::spawn_blocking(move || execute(&engine, &request)).await {
                    Ok(result) => result,
                    Err(e) => CalculationResult::failed(
                        calculation_id,
                        vec![ErrorInfo::new(
                            ErrorCode::NotEvaluable,
                            format!("Calculation task failed: {}", e),
                        )],
                    ),
                }
            }
        });

        let mut results = join_all(tasks).await;
        results.sort_by(|a, b| a.calculation_id.cmp(&b.calculation_id));

        let failed = results.iter().filter(|r| !r.is_completed()).count();
        info!(
            calculations = count,
            failed,
            "Executed calculation batch in {:?}",
            start.elapsed()
        );
        results
    }
}

fn execute(engine: &FormulaEngine, request: &CalculationRequest) -> CalculationResult {
    let id = request.calculation_id.clone();
    let validated = engine.submit_wire(&request.formula_location);
    let Some(location) = validated.location else {
        let errors = validated.result.errors().cloned().collect();
        warn!(calculation = %id, "Calculation rejected: formula location is invalid");
        return CalculationResult::failed(id, errors);
    };

    let outcome = match request.time_slice_id {
        Some(slice_id) => match location.time_slice(slice_id) {
            Some(slice) => engine.evaluate_slice(
                slice,
                location.location(),
                &request.inputs,
                &request.period,
                &request.output,
            ),
            None => Err(EvalError::invalid_parameter(format!(
                "Time slice {} does not exist in {}",
                slice_id,
                location.location()
            ))),
        },
        None => engine.evaluate_location(&location, &request.inputs, &request.period, &request.output),
    };

    match outcome {
        Ok(output) => {
            debug!(calculation = %id, intervals = output.intervals.len(), "Calculation completed");
            CalculationResult::completed(id, output)
        },
        Err(e) => {
            warn!(calculation = %id, code = %e.code, "Calculation failed: {}", e);
            CalculationResult::failed(id, vec![e.to_error_info()])
        },
    }
}
