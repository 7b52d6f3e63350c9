use gat_core::LimitViolation;
use serde::{Deserialize, Serialize};

/// Terminal state of one scenario. Every variant is a normal, reportable
/// outcome; errors are reported through `GatError` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioOutcome {
    NoViolations,
    Diverged,
    NoRuleMatched,
    MaxRoundsReached,
    /// Pre-contingency run with violation checking disabled.
    ViolationsIgnored,
}

impl ScenarioOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioOutcome::NoViolations => "NO_VIOLATIONS",
            ScenarioOutcome::Diverged => "DIVERGED",
            ScenarioOutcome::NoRuleMatched => "NO_RULE_MATCHED",
            ScenarioOutcome::MaxRoundsReached => "MAX_ROUNDS_REACHED",
            ScenarioOutcome::ViolationsIgnored => "VIOLATIONS_IGNORED",
        }
    }
}

impl std::fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// `None` for the pre-contingency scenario.
    pub contingency_id: Option<String>,
    pub outcome: ScenarioOutcome,
    /// Completed rounds (number of times an action round finished).
    pub rounds: usize,
    /// Applied actions, in order.
    pub actions: Vec<String>,
    /// Violations found by the last converged load flow.
    pub violations: Vec<LimitViolation>,
    /// Test actions that removed every violation on their trial state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub solving_tests: Vec<String>,
}

impl ScenarioResult {
    /// Contingency id, or `"N"` for the pre-contingency scenario.
    pub fn label(&self) -> &str {
        self.contingency_id.as_deref().unwrap_or("N")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub pre_contingency: ScenarioResult,
    pub post_contingency: Vec<ScenarioResult>,
    /// Contingencies not simulated because the pre-contingency scenario did
    /// not end cleanly.
    pub skipped: Vec<String>,
}

impl SimulationReport {
    pub fn scenario(&self, contingency_id: &str) -> Option<&ScenarioResult> {
        self.post_contingency
            .iter()
            .find(|s| s.contingency_id.as_deref() == Some(contingency_id))
    }

    pub fn outcome_count(&self, outcome: ScenarioOutcome) -> usize {
        std::iter::once(&self.pre_contingency)
            .chain(&self.post_contingency)
            .filter(|s| s.outcome == outcome)
            .count()
    }
}
