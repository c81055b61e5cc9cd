//! Subcommand handlers
//!
//! Documents go to stdout in the selected output format; human readable
//! progress and summaries go to stderr.

use crate::input::{self, render_document, OutputFormat};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use colored::*;
use formel_calc::{
    validate_formula, CalculationRequest, CalculationResult, CalculationRunner, FormulaEngine,
    FormulaRegistry, SubmissionEnvelope, SubmissionResult,
};
use formel_model::wire::{WireCalculationFormula, WireFormulaLocation};
use formel_model::{DomainExpression, LocationId, TransactionId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state of one CLI invocation
pub struct CommandContext {
    pub engine: Arc<FormulaEngine>,
    pub output: OutputFormat,
}

impl CommandContext {
    fn emit<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", render_document(value, self.output)?);
        Ok(())
    }
}

fn print_submission(result: &SubmissionResult) {
    let location = result.location_id.as_deref().unwrap_or("-");
    if result.is_accepted() {
        eprintln!("{} {} accepted", "OK".green().bold(), location);
    } else {
        eprintln!("{} {} rejected", "FAIL".red().bold(), location);
    }
    for error in &result.location_errors {
        eprintln!("  {} {}", "-".red(), error);
    }
    for slice in &result.per_slice_results {
        let id = slice
            .time_slice_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        if slice.valid {
            eprintln!("  time slice {} {}", id, "valid".green());
        } else {
            eprintln!("  time slice {} {}", id, "invalid".red());
            for error in &slice.errors {
                eprintln!("    {} {}", "-".red(), error);
            }
        }
    }
}

fn print_calculation(result: &CalculationResult) {
    if result.is_completed() {
        let intervals = result.output.as_ref().map(|o| o.intervals.len()).unwrap_or(0);
        eprintln!(
            "{} {} ({} intervals)",
            "COMPLETED".green().bold(),
            result.calculation_id,
            intervals
        );
    } else {
        eprintln!("{} {}", "FAILED".red().bold(), result.calculation_id);
        for error in &result.errors {
            eprintln!("  {} {}", "-".red(), error);
        }
    }
}

/// Validate a wire formula location
pub fn validate(ctx: &CommandContext, file: &Path, report: bool) -> Result<()> {
    let wire: WireFormulaLocation = input::read_document(file)?;
    let validated = ctx.engine.submit_wire(&wire);
    print_submission(&validated.result);
    if report {
        ctx.emit(&validated.result)?;
    }
    if !validated.result.is_accepted() {
        bail!("Formula location rejected");
    }
    Ok(())
}

/// Lower a named-function expression into the wire formula
pub fn convert(ctx: &CommandContext, file: &Path, bind: &[String]) -> Result<()> {
    let expr: DomainExpression = input::read_document(file)?;
    let bindings = input::bindings(bind)?;
    let formula = ctx.engine.convert_to_wire_form(&expr, &bindings)?;
    eprintln!("{} {}", "Formula:".bright_cyan(), formula);
    ctx.emit(&WireCalculationFormula::from(&formula))
}

/// Lift a wire formula into named-function form
pub fn render(ctx: &CommandContext, file: &Path) -> Result<()> {
    let wire: WireCalculationFormula = input::read_document(file)?;
    let formula = match validate_formula(&wire, ctx.engine.config().max_formula_depth) {
        Ok(formula) => formula,
        Err(errors) => {
            for error in &errors {
                eprintln!("{} {}", "-".red(), error);
            }
            bail!("Invalid calculation formula ({} errors)", errors.len());
        },
    };
    let expr = ctx.engine.render_for_display(&formula);
    eprintln!("{} {}", "Expression:".bright_cyan(), expr);
    ctx.emit(&expr)
}

/// Run one calculation request
pub fn evaluate(ctx: &CommandContext, file: &Path) -> Result<()> {
    let request: CalculationRequest = input::read_document(file)?;
    let runner = CalculationRunner::new(ctx.engine.clone());
    let result = runner.run(&request);
    print_calculation(&result);
    ctx.emit(&result)?;
    if !result.is_completed() {
        bail!("Calculation {} failed", result.calculation_id);
    }
    Ok(())
}

/// Run a list of calculation requests concurrently
pub async fn batch(ctx: &CommandContext, file: &Path) -> Result<()> {
    let requests: Vec<CalculationRequest> = input::read_document(file)?;
    let total = requests.len();
    let runner = CalculationRunner::new(ctx.engine.clone());
    let results = runner.run_batch(requests).await;

    for result in &results {
        print_calculation(result);
    }
    ctx.emit(&results)?;

    let failed = results.iter().filter(|r| !r.is_completed()).count();
    if failed > 0 {
        bail!("{} of {} calculations failed", failed, total);
    }
    Ok(())
}

/// Submit locations in order and resolve the formula valid at `at`
pub fn resolve(ctx: &CommandContext, files: &[PathBuf], at: Option<DateTime<Utc>>) -> Result<()> {
    let registry = FormulaRegistry::new(ctx.engine.clone());
    for file in files {
        let wire: WireFormulaLocation = input::read_document(file)?;
        let envelope = SubmissionEnvelope::new(&TransactionId::new_v4(), Utc::now());
        let receipt = registry.submit(&envelope, &wire);
        debug!(file = %file.display(), transaction = %receipt.transaction_id, "Submitted");
        print_submission(&receipt.result);
    }

    let summaries = registry.list();
    info!(locations = summaries.len(), "Registry loaded");
    ctx.emit(&summaries)?;

    let Some(at) = at else {
        return Ok(());
    };
    for summary in &summaries {
        let Some(location) = LocationId::parse(&summary.location_id) else {
            continue;
        };
        match registry.resolve(&location, at) {
            Some(slice) => eprintln!(
                "{} {} time slice {}: {}",
                at.to_rfc3339().bright_cyan(),
                location,
                slice.id,
                slice.formula
            ),
            None => eprintln!(
                "{} {} {}",
                at.to_rfc3339().bright_cyan(),
                location,
                "no formula".yellow()
            ),
        }
    }
    Ok(())
}
