//! Engine configuration

use serde::{Deserialize, Serialize};

/// Formula engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest formula tree accepted by validation and evaluation
    pub max_formula_depth: usize,
    /// Permits of the calculation runner
    pub max_concurrent_calculations: usize,
    /// Decimal places of output quantities
    pub quantity_scale: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_formula_depth: 32,
            max_concurrent_calculations: 4,
            quantity_scale: 6,
        }
    }
}
