//! formelctl - Calculation formula tool
//!
//! Validates, converts, renders and evaluates EDI@Energy calculation
//! formulas stored as JSON or YAML documents.

mod commands;
mod input;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use commands::CommandContext;
use common::{init_logging, load_config, LogConfig, LogFormat};
use formel_calc::{EngineConfig, FormulaEngine};
use input::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "formelctl")]
#[command(about = "Calculation formula tool for EDI@Energy formula locations")]
#[command(long_about = "Calculation formula tool for EDI@Energy formula locations

Commands:
  validate    Validate a wire formula location
  convert     Lower a named-function expression into a wire formula
  render      Lift a wire formula into named-function form
  evaluate    Run one calculation request
  batch       Run a list of calculation requests concurrently
  resolve     Submit formula locations and resolve the formula valid at a time

Examples:
  formelctl validate location.json
  formelctl convert expr.yaml --bind feedIn=DE00014545768S0000000000000003054
  formelctl evaluate request.json -o yaml
  formelctl resolve v1.json v2.json --at 2024-06-01T00:00:00Z

Input documents are JSON or YAML (by extension); '-' reads JSON from stdin.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (.toml, .yaml, .json)
    #[arg(short, long, global = true, env = "FORMEL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Console log format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Output document format
    #[arg(short, long, global = true, value_enum, default_value = "json")]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a wire formula location
    Validate {
        file: PathBuf,

        /// Print the full submission result document
        #[arg(short, long)]
        report: bool,
    },

    /// Lower a named-function expression into a wire formula
    Convert {
        file: PathBuf,

        /// Bind a series name to a meter location: name=meloId
        #[arg(short, long = "bind")]
        bind: Vec<String>,
    },

    /// Lift a wire formula into named-function form
    Render { file: PathBuf },

    /// Run one calculation request
    Evaluate { file: PathBuf },

    /// Run a list of calculation requests concurrently
    Batch { file: PathBuf },

    /// Submit formula locations in order and resolve the formula valid at a time
    Resolve {
        files: Vec<PathBuf>,

        /// Instant to resolve (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

/// formelctl configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    engine: EngineConfig,
    logging: LogConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config: CliConfig = load_config(cli.config.as_deref())
        .context("Failed to load formelctl configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    let log_guard = init_logging(&config.logging)?;

    let ctx = CommandContext {
        engine: Arc::new(FormulaEngine::with_config(config.engine)),
        output: cli.output,
    };

    let outcome = match &cli.command {
        Commands::Validate { file, report } => commands::validate(&ctx, file, *report),
        Commands::Convert { file, bind } => commands::convert(&ctx, file, bind),
        Commands::Render { file } => commands::render(&ctx, file),
        Commands::Evaluate { file } => commands::evaluate(&ctx, file),
        Commands::Batch { file } => commands::batch(&ctx, file).await,
        Commands::Resolve { files, at } => commands::resolve(&ctx, files, *at),
    };

    if let Err(e) = &outcome {
        drop(log_guard);
        eprintln!("{} {:#}", "ERROR".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}
