use crate::context::RunningContext;
use crate::observer::SimulatorObserver;
use crate::outcome::ScenarioOutcome;
use crate::rule::RuleEvaluationStatus;
use gat_core::{LimitViolation, LoadFlowResult};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoundTrace {
    pub round: usize,
    pub diverged: bool,
    pub violations: Vec<LimitViolation>,
    pub rules: Vec<(String, RuleEvaluationStatus)>,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioTrace {
    pub contingency_id: Option<String>,
    pub rounds: Vec<RoundTrace>,
    pub tests: Vec<String>,
    pub outcome: Option<ScenarioOutcome>,
}

#[derive(Debug, Default)]
struct Collected {
    finished: Vec<ScenarioTrace>,
    current: Option<ScenarioTrace>,
}

/// Round-by-round trace of every scenario.
///
/// Cloning shares the underlying storage, so one clone can be registered on
/// the bus and another read after the run.
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    inner: Arc<Mutex<Collected>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_round(&self, f: impl FnOnce(&mut RoundTrace)) {
        let mut collected = self.lock();
        if let Some(round) = collected.current.as_mut().and_then(|s| s.rounds.last_mut()) {
            f(round);
        }
    }

    fn start(&self, ctx: &RunningContext<'_>) {
        self.lock().current = Some(ScenarioTrace {
            contingency_id: ctx.contingency_id().map(str::to_string),
            ..Default::default()
        });
    }

    /// Finished scenarios, in execution order.
    pub fn traces(&self) -> Vec<ScenarioTrace> {
        self.lock().finished.clone()
    }

    /// Trace of a finished scenario; `None` selects the pre-contingency one.
    pub fn scenario(&self, contingency_id: Option<&str>) -> Option<ScenarioTrace> {
        self.lock()
            .finished
            .iter()
            .find(|s| s.contingency_id.as_deref() == contingency_id)
            .cloned()
    }
}

impl SimulatorObserver for ResultCollector {
    fn name(&self) -> &str {
        "result-collector"
    }

    fn before_pre_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {
        self.start(ctx);
    }

    fn before_post_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {
        self.start(ctx);
    }

    fn round_begin(&mut self, ctx: &RunningContext<'_>) {
        if let Some(scenario) = self.lock().current.as_mut() {
            scenario.rounds.push(RoundTrace {
                round: ctx.round(),
                ..Default::default()
            });
        }
    }

    fn load_flow_converged(&mut self, _ctx: &RunningContext<'_>, violations: &[LimitViolation]) {
        self.with_round(|r| r.violations = violations.to_vec());
    }

    fn load_flow_diverged(&mut self, _ctx: &RunningContext<'_>, _result: &LoadFlowResult) {
        self.with_round(|r| r.diverged = true);
    }

    fn rule_evaluated(&mut self, _ctx: &RunningContext<'_>, rule_id: &str, status: RuleEvaluationStatus) {
        self.with_round(|r| r.rules.push((rule_id.to_string(), status)));
    }

    fn after_action(&mut self, _ctx: &RunningContext<'_>, action_id: &str) {
        self.with_round(|r| r.actions.push(action_id.to_string()));
    }

    fn after_test(&mut self, _ctx: &RunningContext<'_>, action_id: &str) {
        if let Some(scenario) = self.lock().current.as_mut() {
            scenario.tests.push(action_id.to_string());
        }
    }

    fn scenario_finished(&mut self, _ctx: &RunningContext<'_>, outcome: ScenarioOutcome) {
        let mut collected = self.lock();
        if let Some(mut scenario) = collected.current.take() {
            scenario.outcome = Some(outcome);
            collected.finished.push(scenario);
        }
    }
}
