//! Run-time settings of a [`crate::SequenceExecutor`].
//!
//! Every field has a default, so a configuration file only needs the keys it changes:
//!
//! ```json
//! {
//!   "inter_loop_delay": 0.5,
//!   "line_mapping": {"FIO4": "Laser", "FIO5": "PMT", "FIO6": "Sync", "FIO7": "Wait"}
//! }
//! ```

use std::path::Path;

use optocompiler_backend::LineMapping;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidTime { field: &'static str, value: f64 },
    #[error("wait_poll_interval must be greater than zero")]
    ZeroPollInterval,
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Seconds slept between two loops of a program.
    pub inter_loop_delay: f64,
    /// Seconds between two reads of the wait line.
    pub wait_poll_interval: f64,
    /// Level of the wait line that releases a waiting element.
    pub wait_trigger_level: bool,
    /// Let element sleeps and wait polling end early on interrupt.
    pub interrupt_during_waits: bool,
    /// Drive every line to idle before the first element.
    pub clear_lines_on_start: bool,
    pub line_mapping: LineMapping,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            inter_loop_delay: 0.0,
            wait_poll_interval: 0.1,
            wait_trigger_level: false,
            interrupt_during_waits: false,
            clear_lines_on_start: true,
            line_mapping: LineMapping::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ExecutorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("inter_loop_delay", self.inter_loop_delay),
            ("wait_poll_interval", self.wait_poll_interval),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidTime { field, value });
            }
        }
        if self.wait_poll_interval == 0.0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use optocompiler_backend::{Fio, LineRole};

    #[test]
    fn empty_object_gives_defaults() {
        let config = ExecutorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.wait_poll_interval, 0.1);
        assert!(!config.wait_trigger_level);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = ExecutorConfig::from_json_str(
            r#"{"inter_loop_delay": 0.5, "line_mapping": {"FIO5": "Wait", "FIO4": "Laser"}}"#,
        )
        .unwrap();
        assert_eq!(config.inter_loop_delay, 0.5);
        assert_eq!(config.line_mapping.line_for(LineRole::Wait), Some(Fio::Fio5));
        assert_eq!(config.line_mapping.line_for(LineRole::Sync), None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            ExecutorConfig::from_json_str(r#"{"inter_loop_delay": -1.0}"#),
            Err(ConfigError::InvalidTime { field: "inter_loop_delay", .. })
        ));
        assert!(matches!(
            ExecutorConfig::from_json_str(r#"{"wait_poll_interval": 0.0}"#),
            Err(ConfigError::ZeroPollInterval)
        ));
        assert!(matches!(
            ExecutorConfig::from_json_str(r#"{"line_mapping": {"FIO12": "Laser"}}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn serialised_config_reloads() {
        let mut config = ExecutorConfig::default();
        config.interrupt_during_waits = true;
        let json = config.to_json_string().unwrap();
        assert_eq!(ExecutorConfig::from_json_str(&json).unwrap(), config);
    }
}
