use crate::context::RunningContext;
use crate::observer::SimulatorObserver;
use crate::outcome::ScenarioOutcome;
use crate::rule::RuleEvaluationStatus;
use gat_core::limits::format_violations;
use gat_core::{LimitViolation, LoadFlowResult};
use tracing::{debug, info, warn};

/// Narrates the simulation through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    load_flow_name: String,
    debug: bool,
}

impl LoggingObserver {
    pub fn new(load_flow_name: impl Into<String>, debug: bool) -> Self {
        Self {
            load_flow_name: load_flow_name.into(),
            debug,
        }
    }
}

impl SimulatorObserver for LoggingObserver {
    fn name(&self) -> &str {
        "logging"
    }

    fn before_pre_contingency_analysis(&mut self, _ctx: &RunningContext<'_>) {
        info!("Starting pre-contingency analysis");
    }

    fn before_post_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {
        info!("Starting post-contingency analysis '{}'", ctx.scenario_label());
    }

    fn round_begin(&mut self, ctx: &RunningContext<'_>) {
        info!(scenario = ctx.scenario_label(), round = ctx.round(), "Running loadflow ({})", self.load_flow_name);
    }

    fn load_flow_converged(&mut self, ctx: &RunningContext<'_>, violations: &[LimitViolation]) {
        if !violations.is_empty() {
            info!(scenario = ctx.scenario_label(), "Violations: \n{}", format_violations(violations));
        }
    }

    fn load_flow_diverged(&mut self, ctx: &RunningContext<'_>, result: &LoadFlowResult) {
        warn!(scenario = ctx.scenario_label(), "Loadflow diverged: {:?}", result.metrics);
    }

    fn no_more_violations(&mut self, ctx: &RunningContext<'_>) {
        info!(scenario = ctx.scenario_label(), "No more violation");
    }

    fn violations_but_no_rule_matched(&mut self, ctx: &RunningContext<'_>) {
        info!(scenario = ctx.scenario_label(), "Still some violations and no rule match");
    }

    fn max_rounds_reached(&mut self, ctx: &RunningContext<'_>) {
        warn!(scenario = ctx.scenario_label(), round = ctx.round(), "Max number of rounds reached");
    }

    fn rule_evaluated(&mut self, ctx: &RunningContext<'_>, rule_id: &str, status: RuleEvaluationStatus) {
        if self.debug {
            debug!(scenario = ctx.scenario_label(), round = ctx.round(), "Rule '{}' evaluated to {}", rule_id, status);
        }
    }

    fn before_action(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        info!(scenario = ctx.scenario_label(), round = ctx.round(), "Apply action '{}'", action_id);
    }

    fn before_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        info!(scenario = ctx.scenario_label(), "Try {}", action_id);
    }

    fn no_more_violations_after_test(&mut self, _ctx: &RunningContext<'_>, action_id: &str) {
        info!("Loadflow with try {} works already", action_id);
    }

    fn violations_after_test(&mut self, _ctx: &RunningContext<'_>, action_id: &str, violations: &[LimitViolation]) {
        info!("Loadflow with try {} exits with violations", action_id);
        if self.debug {
            debug!("Violations: \n{}", format_violations(violations));
        }
    }

    fn diverged_after_test(&mut self, _ctx: &RunningContext<'_>, action_id: &str) {
        info!("Loadflow with try {} diverged", action_id);
    }

    fn scenario_finished(&mut self, ctx: &RunningContext<'_>, outcome: ScenarioOutcome) {
        debug!(scenario = ctx.scenario_label(), rounds = ctx.round(), %outcome, "scenario finished");
    }
}
