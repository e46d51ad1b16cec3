//! Configuration for the evaluation engine.
//!
//! Rate settings and integrated-circuit definitions can be declared in a
//! YAML or JSON file.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! target_tickrate: 2400   # ticks per minute
//! throttle: true
//! start_running: false
//! realistic: false        # power-on unknowns and transition glitches
//! log_level: info
//! root_circuit: 0
//!
//! circuits:
//!   - id: 1
//!     inputs:
//!       - block: { x: 0, y: 0 }
//!     outputs:
//!       - block: { x: 2, y: 0 }
//!     blocks:
//!       - op: place_block
//!         position: { x: 0, y: 0 }
//!         kind: switch
//!       - op: place_block
//!         position: { x: 1, y: 0 }
//!         kind: nor
//!       - op: place_block
//!         position: { x: 2, y: 0 }
//!         kind: light
//!       - op: create_connection
//!         output: { block: { x: 0, y: 0 } }
//!         input: { block: { x: 1, y: 0 } }
//!       - op: create_connection
//!         output: { block: { x: 1, y: 0 } }
//!         input: { block: { x: 2, y: 0 } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::difference::{Difference, PortRef};
use crate::evaluator::IcDefinition;
use crate::simulator::DEFAULT_TICKRATE;
use crate::types::CircuitId;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// An integrated circuit declared in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Circuit identifier used by `custom` blocks
    pub id: CircuitId,

    /// Inner block ports exposed as the circuit's input ports, in order
    #[serde(default)]
    pub inputs: Vec<PortRef>,

    /// Inner block ports exposed as the circuit's output ports, in order
    #[serde(default)]
    pub outputs: Vec<PortRef>,

    /// Modifications that build the circuit from empty
    #[serde(default)]
    pub blocks: Difference,
}

impl CircuitConfig {
    pub fn definition(&self) -> IcDefinition {
        IcDefinition::new(self.blocks.clone(), self.inputs.clone(), self.outputs.clone())
    }
}

/// Evaluator settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Target rate in ticks per minute
    #[serde(default = "default_tickrate")]
    pub target_tickrate: u64,

    /// Whether ticks are rate limited at all
    #[serde(default = "default_throttle")]
    pub throttle: bool,

    /// Whether the worker starts ticking immediately
    #[serde(default)]
    pub start_running: bool,

    /// Reset combinational gates to UNDEFINED and pass a changing output
    /// through UNDEFINED for one tick
    #[serde(default)]
    pub realistic: bool,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Circuit id of the root circuit
    #[serde(default)]
    pub root_circuit: CircuitId,

    /// Integrated circuits available to `custom` blocks
    #[serde(default)]
    pub circuits: Vec<CircuitConfig>,
}

fn default_tickrate() -> u64 {
    DEFAULT_TICKRATE
}

fn default_throttle() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            target_tickrate: default_tickrate(),
            throttle: default_throttle(),
            start_running: false,
            realistic: false,
            log_level: default_log_level(),
            root_circuit: 0,
            circuits: Vec::new(),
        }
    }
}

impl EvalConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: EvalConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: EvalConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_tickrate == 0 {
            return Err(ConfigError::Validation(
                "target_tickrate must be at least 1 tick per minute".to_string(),
            ));
        }
        if !self.throttle && self.target_tickrate != DEFAULT_TICKRATE {
            tracing::warn!(
                "target_tickrate {} is ignored while throttle is off",
                self.target_tickrate
            );
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level: {}",
                self.log_level
            )));
        }

        let mut circuit_ids = HashSet::new();
        for circuit in &self.circuits {
            if circuit.id == self.root_circuit {
                return Err(ConfigError::Validation(format!(
                    "Circuit {} reuses the root circuit id",
                    circuit.id
                )));
            }
            if !circuit_ids.insert(circuit.id) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate circuit ID: {}",
                    circuit.id
                )));
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating EvalConfig programmatically.
#[derive(Default)]
pub struct EvalConfigBuilder {
    config: EvalConfig,
}

impl EvalConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target rate in ticks per minute.
    pub fn target_tickrate(mut self, ticks_per_minute: u64) -> Self {
        self.config.target_tickrate = ticks_per_minute;
        self
    }

    /// Enables or disables rate limiting.
    pub fn throttle(mut self, enable: bool) -> Self {
        self.config.throttle = enable;
        self
    }

    /// Starts the worker ticking as soon as the evaluator exists.
    pub fn start_running(mut self, enable: bool) -> Self {
        self.config.start_running = enable;
        self
    }

    /// Switches between the ideal and the realistic gate model.
    pub fn realistic(mut self, enable: bool) -> Self {
        self.config.realistic = enable;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn root_circuit(mut self, id: CircuitId) -> Self {
        self.config.root_circuit = id;
        self
    }

    /// Declares an integrated circuit.
    pub fn add_circuit(mut self, id: CircuitId, definition: IcDefinition) -> Self {
        self.config.circuits.push(CircuitConfig {
            id,
            inputs: definition.inputs,
            outputs: definition.outputs,
            blocks: definition.difference,
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<EvalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Position;
    use crate::difference::{BlockKind, Modification};

    #[test]
    fn test_default_config() {
        let config = EvalConfig::new();
        assert_eq!(config.target_tickrate, 2400);
        assert!(config.throttle);
        assert!(!config.start_running);
        assert!(!config.realistic);
        assert!(config.circuits.is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
target_tickrate: 600
start_running: true
log_level: debug

circuits:
  - id: 1
    inputs:
      - block: { x: 0, y: 0 }
    outputs:
      - block: { x: 1, y: 0 }
    blocks:
      - op: place_block
        position: { x: 0, y: 0 }
        kind: switch
      - op: place_block
        position: { x: 1, y: 0 }
        kind: nor
      - op: create_connection
        output: { block: { x: 0, y: 0 } }
        input: { block: { x: 1, y: 0 } }
"#;

        let config = EvalConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.target_tickrate, 600);
        assert!(config.throttle);
        assert!(config.start_running);
        assert_eq!(config.log_level, "debug");

        let circuit = &config.circuits[0];
        assert_eq!(circuit.id, 1);
        assert_eq!(circuit.blocks.len(), 3);
        assert_eq!(circuit.inputs[0].block, Position::new(0, 0));
        assert_eq!(circuit.outputs[0].port, 0);
        assert!(matches!(
            circuit.blocks.modifications()[1],
            Modification::PlaceBlock { kind: BlockKind::Nor, .. }
        ));
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{ "target_tickrate": 120, "throttle": false, "realistic": true }"#;
        let config = EvalConfig::from_json(json).unwrap();
        assert_eq!(config.target_tickrate, 120);
        assert!(!config.throttle);
        assert!(config.realistic);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_validation_zero_tickrate() {
        let result = EvalConfig::from_json(r#"{ "target_tickrate": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_duplicate_circuit() {
        let result = EvalConfigBuilder::new()
            .add_circuit(3, IcDefinition::default())
            .add_circuit(3, IcDefinition::default())
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_root_id_clash() {
        let result = EvalConfigBuilder::new()
            .root_circuit(2)
            .add_circuit(2, IcDefinition::default())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_log_level() {
        let result = EvalConfigBuilder::new().log_level("loud").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder() {
        let config = EvalConfigBuilder::new()
            .target_tickrate(6000)
            .throttle(false)
            .start_running(true)
            .realistic(true)
            .build()
            .unwrap();
        assert_eq!(config.target_tickrate, 6000);
        assert!(!config.throttle);
        assert!(config.start_running);
        assert!(config.realistic);
    }

    #[test]
    fn test_unknown_format() {
        let result = EvalConfig::from_file("circuit.toml");
        assert!(matches!(result, Err(ConfigError::UnknownFormat(ext)) if ext == "toml"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = EvalConfigBuilder::new()
            .target_tickrate(300)
            .add_circuit(
                1,
                IcDefinition::new(
                    Difference::new().place((0, 0), BlockKind::Switch),
                    vec![PortRef::new(Position::new(0, 0), 0)],
                    Vec::new(),
                ),
            )
            .build()
            .unwrap();
        let yaml = config.to_yaml().unwrap();
        let back = EvalConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
