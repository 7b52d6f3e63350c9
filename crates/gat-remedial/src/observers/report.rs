use crate::context::RunningContext;
use crate::observer::SimulatorObserver;
use crate::outcome::ScenarioOutcome;
use crate::rule::RuleEvaluationStatus;
use gat_core::{LimitViolation, LoadFlowResult};
use std::io::Write;

/// Plain-text event log, one line per event, prefixed with the scenario
/// label. Write errors are logged once and further output is dropped.
pub struct ReportWriter<W: Write + Send> {
    out: W,
    failed: bool,
}

impl<W: Write + Send> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    fn line(&mut self, ctx: Option<&RunningContext<'_>>, text: std::fmt::Arguments<'_>) {
        if self.failed {
            return;
        }
        let result = match ctx {
            Some(ctx) => writeln!(self.out, "[{}] {}", ctx.scenario_label(), text),
            None => writeln!(self.out, "{}", text),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "report write failed, disabling report");
            self.failed = true;
        }
    }

    fn flush(&mut self) {
        if !self.failed {
            if let Err(e) = self.out.flush() {
                tracing::error!(error = %e, "report flush failed");
                self.failed = true;
            }
        }
    }
}

impl<W: Write + Send> SimulatorObserver for ReportWriter<W> {
    fn name(&self) -> &str {
        "report-writer"
    }

    fn before_pre_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {
        self.line(Some(ctx), format_args!("pre-contingency analysis"));
    }

    fn before_post_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {
        self.line(Some(ctx), format_args!("post-contingency analysis"));
    }

    fn round_begin(&mut self, ctx: &RunningContext<'_>) {
        self.line(Some(ctx), format_args!("round {}", ctx.round()));
    }

    fn load_flow_converged(&mut self, ctx: &RunningContext<'_>, violations: &[LimitViolation]) {
        self.line(
            Some(ctx),
            format_args!("load flow converged, {} violation(s)", violations.len()),
        );
        for v in violations {
            self.line(
                Some(ctx),
                format_args!("  {} {} {:.2} > {:.2}", v.subject_id, v.kind, v.value, v.limit * v.limit_reduction),
            );
        }
    }

    fn load_flow_diverged(&mut self, ctx: &RunningContext<'_>, _result: &LoadFlowResult) {
        self.line(Some(ctx), format_args!("load flow diverged"));
    }

    fn no_more_violations(&mut self, ctx: &RunningContext<'_>) {
        self.line(Some(ctx), format_args!("no more violations"));
    }

    fn violations_but_no_rule_matched(&mut self, ctx: &RunningContext<'_>) {
        self.line(Some(ctx), format_args!("violations remain and no rule matched"));
    }

    fn max_rounds_reached(&mut self, ctx: &RunningContext<'_>) {
        self.line(Some(ctx), format_args!("max rounds reached"));
    }

    fn rule_evaluated(&mut self, ctx: &RunningContext<'_>, rule_id: &str, status: RuleEvaluationStatus) {
        self.line(Some(ctx), format_args!("rule '{rule_id}' {status}"));
    }

    fn before_action(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.line(Some(ctx), format_args!("apply action '{action_id}'"));
    }

    fn before_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.line(Some(ctx), format_args!("try '{action_id}'"));
    }

    fn no_more_violations_after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.line(Some(ctx), format_args!("try '{action_id}' solves the violations"));
    }

    fn violations_after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str, violations: &[LimitViolation]) {
        self.line(
            Some(ctx),
            format_args!("try '{action_id}' leaves {} violation(s)", violations.len()),
        );
    }

    fn diverged_after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.line(Some(ctx), format_args!("try '{action_id}' diverged"));
    }

    fn scenario_finished(&mut self, ctx: &RunningContext<'_>, outcome: ScenarioOutcome) {
        self.line(Some(ctx), format_args!("finished: {outcome}"));
        self.flush();
    }

    fn after_post_contingency_analysis(&mut self) {
        self.line(None, format_args!("simulation done"));
        self.flush();
    }
}
