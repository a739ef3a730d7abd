//! YAML run configuration shared by every command.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use hdx_core::{CoverageRules, ErrorInfo, HdxError};
use hdx_global::GlobalFitConfig;
use hdx_kinetics::InitialGuessConfig;

fn default_temperature() -> f64 {
    293.15
}

fn default_ph() -> f64 {
    8.0
}

/// Experimental conditions plus the settings of both fit stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdxConfig {
    /// Temperature in Kelvin, shared by every state.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Measurement pH.
    #[serde(default = "default_ph")]
    pub ph: f64,
    /// Coverage rules applied to each state.
    #[serde(default)]
    pub coverage: CoverageRules,
    /// Initial-guess stage.
    #[serde(default)]
    pub guess: InitialGuessConfig,
    /// Global optimizer stage.
    #[serde(default)]
    pub global: GlobalFitConfig,
}

impl Default for HdxConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            ph: default_ph(),
            coverage: CoverageRules::default(),
            guess: InitialGuessConfig::default(),
            global: GlobalFitConfig::default(),
        }
    }
}

impl HdxConfig {
    /// Reads a YAML document; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, HdxError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = fs::read(path).map_err(|err| {
            HdxError::Config(
                ErrorInfo::new("config_read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        hdx_core::serde::from_yaml_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let yaml = "temperature: 303.15\nglobal:\n  epochs: 50\n  r2: 0.5\nguess:\n  method: half-time\n";
        let config: HdxConfig = hdx_core::serde::from_yaml_slice(yaml.as_bytes()).unwrap();
        assert_eq!(config.temperature, 303.15);
        assert_eq!(config.ph, 8.0);
        assert_eq!(config.global.epochs, 50);
        assert_eq!(config.global.r2, 0.5);
        assert_eq!(config.global.r1, 2.0);
        assert_eq!(config.guess.method, hdx_kinetics::GuessMethod::HalfTime);
        assert_eq!(config.guess.seed, 43);
        assert_eq!(config.coverage, CoverageRules::default());
    }
}
