//! Document loading and printing
//!
//! Input documents are JSON or YAML, chosen by file extension; `-` reads JSON
//! from stdin.

use anyhow::{anyhow, bail, Context, Result};
use formel_calc::Bindings;
use formel_model::{EnergyDirection, MeterLocationId, MeterOperand, Operand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Output encoding of printed documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read stdin")?;
        return serde_json::from_str(&raw).context("Invalid JSON on stdin");
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid YAML in {}", path.display())),
        Some("json") | None => serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
        Some(other) => bail!("Unsupported input format: .{}", other),
    }
}

pub fn render_document<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

/// `name=meloId` binds `name` to a lossless consumption meter
pub fn parse_binding(raw: &str) -> Result<(String, Operand)> {
    let (name, melo) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Binding must be name=meloId, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Binding name is empty in '{}'", raw);
    }
    let melo = MeterLocationId::parse(melo.trim())?;
    Ok((
        name.to_string(),
        Operand::Meter(MeterOperand::lossless(melo, EnergyDirection::Consumption)),
    ))
}

pub fn bindings(raw: &[String]) -> Result<Bindings> {
    raw.iter().try_fold(Bindings::new(), |acc, b| {
        let (name, operand) = parse_binding(b)?;
        Ok(acc.bind(name, operand))
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use formel_model::DomainExpression;
    use tempfile::TempDir;

    #[test]
    fn test_reads_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("expr.json");
        std::fs::write(
            &json,
            r#"{"function": "Grp_Sum", "parameters": [{"type": "timeseries_ref", "value": "lineA"}]}"#,
        )
        .unwrap();
        let yaml = dir.path().join("expr.yaml");
        std::fs::write(
            &yaml,
            "function: Grp_Sum\nparameters:\n  - type: timeseries_ref\n    value: lineA\n",
        )
        .unwrap();

        let a: DomainExpression = read_document(&json).unwrap();
        let b: DomainExpression = read_document(&yaml).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("expr.xml");
        std::fs::write(&path, "<expr/>").unwrap();
        assert!(read_document::<DomainExpression>(&path).is_err());
    }

    #[test]
    fn test_parse_binding() {
        let (name, operand) = parse_binding("feedIn=DE00014545768S0000000000000003054").unwrap();
        assert_eq!(name, "feedIn");
        assert!(matches!(operand, Operand::Meter(_)));

        assert!(parse_binding("feedIn").is_err());
        assert!(parse_binding("=DE00014545768S0000000000000003054").is_err());
        assert!(parse_binding("feedIn=DE1").is_err());
    }
}
