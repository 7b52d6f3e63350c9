use crate::condition::EvaluationContext;
use gat_core::{LimitViolation, Network};
use std::collections::{BTreeSet, HashMap};

/// Identity and progress of one scenario.
///
/// Owns the mutable borrow of the scenario network for the scenario's
/// lifetime. Observers only ever see it through `&RunningContext`.
#[derive(Debug)]
pub struct RunningContext<'a> {
    network: &'a mut Network,
    contingency_id: Option<String>,
    round: usize,
    timeline: Vec<String>,
    rule_match_counts: HashMap<String, u32>,
    tested: BTreeSet<String>,
    solving_tests: Vec<String>,
}

impl<'a> RunningContext<'a> {
    /// Pre-contingency scenario.
    pub fn new(network: &'a mut Network) -> Self {
        Self::with_contingency(network, None)
    }

    pub fn with_contingency(network: &'a mut Network, contingency_id: Option<String>) -> Self {
        Self {
            network,
            contingency_id,
            round: 0,
            timeline: Vec::new(),
            rule_match_counts: HashMap::new(),
            tested: BTreeSet::new(),
            solving_tests: Vec::new(),
        }
    }

    pub fn network(&self) -> &Network {
        &*self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut *self.network
    }

    pub fn contingency_id(&self) -> Option<&str> {
        self.contingency_id.as_deref()
    }

    pub fn is_pre_contingency(&self) -> bool {
        self.contingency_id.is_none()
    }

    /// Contingency id, or `"N"` for the pre-contingency scenario.
    pub fn scenario_label(&self) -> &str {
        self.contingency_id.as_deref().unwrap_or("N")
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub(crate) fn next_round(&mut self) {
        self.round += 1;
    }

    /// Actions applied so far, in order.
    pub fn timeline(&self) -> &[String] {
        &self.timeline
    }

    pub fn action_taken(&self, action_id: &str) -> bool {
        self.timeline.iter().any(|a| a == action_id)
    }

    pub(crate) fn record_action(&mut self, action_id: &str) {
        self.timeline.push(action_id.to_string());
    }

    pub fn rule_match_count(&self, rule_id: &str) -> u32 {
        self.rule_match_counts.get(rule_id).copied().unwrap_or(0)
    }

    pub(crate) fn increment_rule_match_count(&mut self, rule_id: &str) {
        *self.rule_match_counts.entry(rule_id.to_string()).or_insert(0) += 1;
    }

    /// Test actions already tried in this scenario.
    pub fn tested(&self) -> &BTreeSet<String> {
        &self.tested
    }

    pub(crate) fn mark_tested(&mut self, action_id: &str) {
        self.tested.insert(action_id.to_string());
    }

    /// Test actions that removed every violation on their trial state.
    pub fn solving_tests(&self) -> &[String] {
        &self.solving_tests
    }

    pub(crate) fn record_solving_test(&mut self, action_id: &str) {
        self.solving_tests.push(action_id.to_string());
    }

    pub fn evaluation_context<'s>(&'s self, violations: &'s [LimitViolation]) -> EvaluationContext<'s> {
        EvaluationContext {
            network: &*self.network,
            contingency_id: self.contingency_id.as_deref(),
            timeline: &self.timeline,
            violations,
        }
    }
}
