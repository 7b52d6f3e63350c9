use crate::{GatResult, Network};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trait for steady-state solvers.
///
/// Implementations write their results (terminal flows, voltages) into the
/// working variant of the network they are given. Divergence is reported
/// through [`LoadFlowStatus`], not as an error; `Err` is reserved for
/// solver faults (bad input, crashed backend).
pub trait LoadFlow: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, network: &mut Network, parameters: &LoadFlowParameters)
        -> GatResult<LoadFlowResult>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadFlowParameters {
    /// Start from nominal voltages instead of the previous solution.
    pub flat_start: bool,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LoadFlowParameters {
    fn default() -> Self {
        Self {
            flat_start: false,
            max_iterations: 30,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadFlowStatus {
    Converged,
    /// Some synchronous components converged, others did not.
    PartiallyConverged,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFlowResult {
    pub status: LoadFlowStatus,
    /// Free-form solver metrics (iteration counts, timings, ...)
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,
}

impl LoadFlowResult {
    pub fn converged() -> Self {
        Self {
            status: LoadFlowStatus::Converged,
            metrics: BTreeMap::new(),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: LoadFlowStatus::Failed,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metrics.insert(key.into(), value.to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(
            self.status,
            LoadFlowStatus::Converged | LoadFlowStatus::PartiallyConverged
        )
    }
}
