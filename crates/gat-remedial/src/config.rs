//! Simulator configuration, loadable from TOML.
//!
//! ```toml
//! max_rounds = 5
//! copy_strategy = "state"
//! rule_match_policy = "all-matching"
//! ```

use crate::engine::RuleMatchPolicy;
use crate::strategy::CopyStrategy;
use gat_core::{GatError, GatResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Rounds per scenario before giving up (must be at least 1)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Run the pre-contingency load flow once without checking violations
    #[serde(default)]
    pub ignore_pre_contingency_violations: bool,
    #[serde(default)]
    pub copy_strategy: CopyStrategy,
    #[serde(default)]
    pub rule_match_policy: RuleMatchPolicy,
    /// Apply the first test action that removes every violation
    #[serde(default)]
    pub apply_if_solved_violations: bool,
    /// Registry name of the load flow (registry default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_flow_name: Option<String>,
    /// Factor applied to current limits before comparison
    #[serde(default = "default_limit_reduction")]
    pub limit_reduction: f64,
    /// Verbose logging (violation tables, test details)
    #[serde(default)]
    pub debug: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            ignore_pre_contingency_violations: false,
            copy_strategy: CopyStrategy::default(),
            rule_match_policy: RuleMatchPolicy::default(),
            apply_if_solved_violations: false,
            load_flow_name: None,
            limit_reduction: default_limit_reduction(),
            debug: false,
        }
    }
}

fn default_max_rounds() -> usize {
    10
}

fn default_limit_reduction() -> f64 {
    1.0
}

impl SimulatorConfig {
    pub fn from_toml_str(contents: &str) -> GatResult<Self> {
        let config: SimulatorConfig =
            toml::from_str(contents).map_err(|e| GatError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> GatResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no simulator config, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> GatResult<()> {
        if self.max_rounds == 0 {
            return Err(GatError::Config("max_rounds must be at least 1".into()));
        }
        if !(self.limit_reduction > 0.0 && self.limit_reduction <= 1.0) {
            return Err(GatError::Config(format!(
                "limit_reduction must be in (0, 1], got {}",
                self.limit_reduction
            )));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> GatResult<String> {
        toml::to_string_pretty(self).map_err(|e| GatError::Config(e.to_string()))
    }
}
