// src/config/mod.rs

//! Query configuration.

use crate::core::QramError;
use crate::core::constants::{MAX_TREE_HEIGHT, MIN_DISTILLATION_ATTEMPTS};
use serde::{Deserialize, Serialize};

/// How the data bit is read at the leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadoutMode {
    /// The leaf flips the logical-zero bus when its bit is 1; the bus is then
    /// read out directly.
    #[default]
    Classical,
    /// The bus travels as `|+>_L`; the leaf applies a logical phase flip when
    /// its bit is 1 and a logical Hadamard turns the phase into a bit. An
    /// uncorrected phase error on the way down flips the answer.
    ///
    /// A single fault on the flag carrier inside the routed window raises the
    /// flag without touching the data. It looks exactly like a hook, so the
    /// triggered logical-phase correction lands on clean data and flips the
    /// answer. `Classical` readout is unaffected by that correction.
    PhaseOracle,
}

/// Parameters of a QRAM instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QramConfig {
    /// Number of address bits; the tree has `2^tree_height` leaves.
    pub tree_height: u32,
    /// Restarts allowed after the first attempt.
    pub retry_budget: u32,
    /// 2-for-1 distillation rounds per rail and transfer.
    pub distillation_rounds: u32,
    /// Distillation tries per rail before the transfer fails.
    pub distillation_attempts: u32,
    pub seed: u64,
    pub readout: ReadoutMode,
}

impl Default for QramConfig {
    fn default() -> Self {
        Self {
            tree_height: 3,
            retry_budget: 3,
            distillation_rounds: 1,
            distillation_attempts: 3,
            seed: 0x5eed,
            readout: ReadoutMode::Classical,
        }
    }
}

impl QramConfig {
    /// Default parameters for a tree of `tree_height` levels.
    pub fn with_height(tree_height: u32) -> Self {
        Self { tree_height, ..Self::default() }
    }

    /// Parses and validates a JSON document. Missing fields take their
    /// default values.
    pub fn from_json_str(json: &str) -> Result<Self, QramError> {
        let config: QramConfig = serde_json::from_str(json).map_err(|e| QramError::InvalidConfig {
            message: format!("malformed configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, QramError> {
        serde_json::to_string_pretty(self).map_err(|e| QramError::InvalidConfig { message: e.to_string() })
    }

    pub fn validate(&self) -> Result<(), QramError> {
        if self.tree_height == 0 || self.tree_height > MAX_TREE_HEIGHT {
            return Err(QramError::InvalidConfig {
                message: format!("tree_height must be in 1..={}, got {}", MAX_TREE_HEIGHT, self.tree_height),
            });
        }
        if self.distillation_attempts < MIN_DISTILLATION_ATTEMPTS {
            return Err(QramError::InvalidConfig {
                message: format!(
                    "distillation_attempts must be at least {}, got {}",
                    MIN_DISTILLATION_ATTEMPTS, self.distillation_attempts
                ),
            });
        }
        if self.distillation_rounds > 3 {
            return Err(QramError::InvalidConfig {
                message: format!("distillation_rounds must be at most 3, got {}", self.distillation_rounds),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(QramConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<(), QramError> {
        let config = QramConfig::from_json_str(r#"{ "tree_height": 2, "readout": "phase_oracle" }"#)?;
        assert_eq!(config.tree_height, 2);
        assert_eq!(config.readout, ReadoutMode::PhaseOracle);
        assert_eq!(config.retry_budget, QramConfig::default().retry_budget);
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range() {
        for json in [
            r#"{ "tree_height": 0 }"#,
            r#"{ "tree_height": 17 }"#,
            r#"{ "distillation_attempts": 1 }"#,
            r#"{ "distillation_rounds": 4 }"#,
            r#"{ "tree_height": "three" }"#,
        ] {
            assert!(
                matches!(QramConfig::from_json_str(json), Err(QramError::InvalidConfig { .. })),
                "{} should be rejected",
                json
            );
        }
    }

    #[test]
    fn test_json_round_trip() -> Result<(), QramError> {
        let config = QramConfig { seed: 99, readout: ReadoutMode::PhaseOracle, ..QramConfig::with_height(4) };
        assert_eq!(QramConfig::from_json_str(&config.to_json_string()?)?, config);
        Ok(())
    }
}
