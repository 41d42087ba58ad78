// Sampling configuration.
//
// Holds the policy knobs of an infill run: temperature, iteration budget,
// annealing schedule, the grid layout used when encoding note sequences, and
// an optional RNG seed. Defaults are 96 iterations at temperature 0.99 with
// the Yao schedule. Configs load from JSON (missing fields take defaults)
// and are validated before use.

use crate::error::{InfillError, Result};
use crate::grid::RollLayout;
use crate::schedule::AnnealSchedule;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TEMPERATURE: f64 = 0.99;
pub const DEFAULT_TOTAL_ITERATIONS: usize = 96;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfillConfig {
    /// Sampling temperature; below 1 sharpens toward the mode.
    pub temperature: f64,
    /// Number of Gibbs iterations.
    pub total_iterations: usize,
    pub schedule: AnnealSchedule,
    pub layout: RollLayout,
    /// Fixed seed for reproducible output; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for InfillConfig {
    fn default() -> Self {
        InfillConfig {
            temperature: DEFAULT_TEMPERATURE,
            total_iterations: DEFAULT_TOTAL_ITERATIONS,
            schedule: AnnealSchedule::default(),
            layout: RollLayout::default(),
            seed: None,
        }
    }
}

impl InfillConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: InfillConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(InfillError::InvalidConfig {
                reason: format!(
                    "temperature must be positive and finite, got {}",
                    self.temperature
                ),
            });
        }
        if self.total_iterations == 0 {
            return Err(InfillError::InvalidConfig {
                reason: "total_iterations must be at least 1".to_string(),
            });
        }
        self.schedule.validate()?;
        self.layout.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InfillConfig::default();
        assert_eq!(config.temperature, 0.99);
        assert_eq!(config.total_iterations, 96);
        assert_eq!(config.schedule, AnnealSchedule::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: InfillConfig =
            serde_json::from_str(r#"{"total_iterations": 12, "seed": 5}"#).unwrap();
        assert_eq!(config.total_iterations, 12);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = InfillConfig {
            temperature: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");
        config.temperature = 1.0;
        config.total_iterations = 0;
        assert!(config.validate().is_err());
        config.total_iterations = 4;
        config.schedule = AnnealSchedule::Constant { p: 2.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"temperature": 0.5, "schedule": {"kind": "constant", "p": 0.3}}"#,
        )
        .unwrap();
        let config = InfillConfig::load(&path).unwrap();
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.schedule, AnnealSchedule::Constant { p: 0.3 });
    }
}
