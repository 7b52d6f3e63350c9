//! Round controller.
//!
//! [`ActionSimulator::start`] runs the pre-contingency scenario, then one
//! scenario per contingency, each on its own state opened by the configured
//! [`CopyStrategy`](crate::CopyStrategy). A scenario loops over rounds:
//!
//! ```text
//! RUN_SOLVER ──diverged──────────────▶ Diverged
//!     │
//! CHECK_VIOLATIONS ──none────────────▶ NoViolations
//!     │
//! EVALUATE_RULES ──no match──────────▶ NoRuleMatched
//!     │
//! APPLY_ACTION ──round == max_rounds─▶ MaxRoundsReached
//!     └──▶ RUN_SOLVER
//! ```

use crate::action::ActionDb;
use crate::cancel::CancellationToken;
use crate::config::SimulatorConfig;
use crate::context::RunningContext;
use crate::engine::RuleEngine;
use crate::observer::{ObserverBus, SimulatorObserver};
use crate::observers::LoggingObserver;
use crate::outcome::{ScenarioOutcome, ScenarioResult, SimulationReport};
use crate::rule::RuleEvaluationStatus;
use gat_core::{
    GatResult, LimitViolation, LimitViolationDetector, LoadFlow, LoadFlowParameters,
    LoadFlowRegistry, Network, ViolationDetector, ViolationFilter,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PRE_CONTINGENCY_STATE: &str = "pre-contingency";

enum RoundStep {
    Continue,
    Finished(ScenarioOutcome),
}

enum TrialOutcome {
    Diverged,
    Converged(Vec<LimitViolation>),
}

pub struct ActionSimulator {
    load_flow: Arc<dyn LoadFlow>,
    parameters: LoadFlowParameters,
    detector: Box<dyn ViolationDetector>,
    config: SimulatorConfig,
    engine: RuleEngine,
    observers: ObserverBus,
    cancel: CancellationToken,
}

impl ActionSimulator {
    /// Violations are detected on current limits only, scaled by
    /// `config.limit_reduction`; see [`with_detector`](Self::with_detector).
    pub fn new(load_flow: Arc<dyn LoadFlow>, config: SimulatorConfig) -> Self {
        let detector = LimitViolationDetector::new(config.limit_reduction, ViolationFilter::current_only());
        Self {
            load_flow,
            parameters: LoadFlowParameters::default(),
            detector: Box::new(detector),
            engine: RuleEngine::new(config.rule_match_policy),
            config,
            observers: ObserverBus::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve `config.load_flow_name` in `registry` (registry default when unset).
    pub fn from_registry(registry: &LoadFlowRegistry, config: SimulatorConfig) -> GatResult<Self> {
        config.validate()?;
        let load_flow = registry.resolve(config.load_flow_name.as_deref())?;
        Ok(Self::new(load_flow, config))
    }

    pub fn with_observer(mut self, observer: Box<dyn SimulatorObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    /// Registers a [`LoggingObserver`].
    pub fn with_default_observers(self) -> Self {
        let logging = LoggingObserver::new(self.load_flow.name(), self.config.debug);
        self.with_observer(Box::new(logging))
    }

    pub fn with_detector(mut self, detector: Box<dyn ViolationDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_parameters(mut self, parameters: LoadFlowParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn observers_mut(&mut self) -> &mut ObserverBus {
        &mut self.observers
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Simulate the pre-contingency case and then every listed contingency.
    ///
    /// The database and contingency ids are validated before any round runs.
    /// `network` is left in its initial state whatever the outcome.
    pub fn start(
        &mut self,
        network: &mut Network,
        db: &ActionDb,
        contingency_ids: &[String],
    ) -> GatResult<SimulationReport> {
        self.config.validate()?;
        db.validate(network)?;
        let contingencies = contingency_ids
            .iter()
            .map(|id| db.contingency(id))
            .collect::<GatResult<Vec<_>>>()?;
        info!(
            network = network.id(),
            contingencies = contingencies.len(),
            rules = db.rules().len(),
            load_flow = self.load_flow.name(),
            "starting remedial action simulation"
        );

        let strategy = self.config.copy_strategy;
        let mut pre_state = strategy.create_state(network, PRE_CONTINGENCY_STATE)?;

        let pre_contingency = {
            let mut ctx = RunningContext::new(&mut pre_state);
            self.observers.notify("before_pre_contingency_analysis", |o| {
                o.before_pre_contingency_analysis(&ctx)
            });
            let result = self.run_scenario(&mut ctx, db)?;
            self.observers
                .notify("after_pre_contingency_analysis", |o| o.after_pre_contingency_analysis());
            result
        };

        let mut report = SimulationReport {
            pre_contingency,
            post_contingency: Vec::with_capacity(contingencies.len()),
            skipped: Vec::new(),
        };

        let proceed = report.pre_contingency.outcome == ScenarioOutcome::NoViolations
            || self.config.ignore_pre_contingency_violations;
        if proceed {
            for contingency in contingencies {
                let label = format!("post-contingency-{}", contingency.id);
                let mut post_state = strategy.create_state(&mut pre_state, &label)?;
                let mut ctx = RunningContext::with_contingency(&mut post_state, Some(contingency.id.clone()));

                self.observers.notify("before_post_contingency_analysis", |o| {
                    o.before_post_contingency_analysis(&ctx)
                });
                let tripped = contingency.apply(ctx.network_mut())?;
                debug!(
                    contingency = %contingency.id,
                    opened = tripped.switches_to_open.len(),
                    disconnected = tripped.terminals_to_disconnect.len(),
                    "contingency applied"
                );
                self.observers.notify("post_contingency_analysis_network_loaded", |o| {
                    o.post_contingency_analysis_network_loaded(&ctx)
                });

                let result = self.run_scenario(&mut ctx, db)?;
                report.post_contingency.push(result);
            }
        } else {
            warn!(
                outcome = %report.pre_contingency.outcome,
                skipped = contingencies.len(),
                "pre-contingency state not secure, skipping post-contingency analysis"
            );
            report.skipped = contingencies.iter().map(|c| c.id.clone()).collect();
        }

        self.observers
            .notify("after_post_contingency_analysis", |o| o.after_post_contingency_analysis());
        Ok(report)
    }

    fn run_scenario(&mut self, ctx: &mut RunningContext<'_>, db: &ActionDb) -> GatResult<ScenarioResult> {
        let mut violations = Vec::new();

        let outcome = loop {
            self.cancel.check(&format!(
                "scenario '{}' round {}",
                ctx.scenario_label(),
                ctx.round()
            ))?;

            self.observers.notify("round_begin", |o| o.round_begin(ctx));
            let step = self.run_round(ctx, db, &mut violations);
            self.observers.notify("round_end", |o| o.round_end(ctx));

            match step? {
                RoundStep::Finished(outcome) => break outcome,
                RoundStep::Continue => {
                    ctx.next_round();
                    if ctx.round() >= self.config.max_rounds {
                        self.observers
                            .notify("max_rounds_reached", |o| o.max_rounds_reached(ctx));
                        break ScenarioOutcome::MaxRoundsReached;
                    }
                }
            }
        };

        self.observers
            .notify("scenario_finished", |o| o.scenario_finished(ctx, outcome));
        info!(
            scenario = ctx.scenario_label(),
            %outcome,
            rounds = ctx.round(),
            actions = ctx.timeline().len(),
            "scenario finished"
        );

        Ok(ScenarioResult {
            contingency_id: ctx.contingency_id().map(str::to_string),
            outcome,
            rounds: ctx.round(),
            actions: ctx.timeline().to_vec(),
            violations,
            solving_tests: ctx.solving_tests().to_vec(),
        })
    }

    fn run_round(
        &mut self,
        ctx: &mut RunningContext<'_>,
        db: &ActionDb,
        last_violations: &mut Vec<LimitViolation>,
    ) -> GatResult<RoundStep> {
        let result = self.load_flow.run(ctx.network_mut(), &self.parameters)?;
        if !result.is_ok() {
            last_violations.clear();
            self.observers
                .notify("load_flow_diverged", |o| o.load_flow_diverged(ctx, &result));
            return Ok(RoundStep::Finished(ScenarioOutcome::Diverged));
        }

        if ctx.is_pre_contingency() && self.config.ignore_pre_contingency_violations {
            last_violations.clear();
            self.observers
                .notify("load_flow_converged", |o| o.load_flow_converged(ctx, &[]));
            return Ok(RoundStep::Finished(ScenarioOutcome::ViolationsIgnored));
        }

        let violations = self.detector.detect(ctx.network())?;
        self.observers
            .notify("load_flow_converged", |o| o.load_flow_converged(ctx, &violations));
        *last_violations = violations.clone();

        if violations.is_empty() {
            self.observers
                .notify("no_more_violations", |o| o.no_more_violations(ctx));
            return Ok(RoundStep::Finished(ScenarioOutcome::NoViolations));
        }

        if let Some(outcome) = self.run_tests(ctx, db, &violations)? {
            return Ok(RoundStep::Finished(outcome));
        }

        let selection = self.engine.select(db.rules(), ctx, &violations)?;
        for evaluation in &selection.evaluations {
            if evaluation.status == RuleEvaluationStatus::True {
                ctx.increment_rule_match_count(&evaluation.rule_id);
            }
            self.observers.notify("rule_evaluated", |o| {
                o.rule_evaluated(ctx, &evaluation.rule_id, evaluation.status)
            });
        }

        if !selection.is_match() {
            self.observers.notify("violations_but_no_rule_matched", |o| {
                o.violations_but_no_rule_matched(ctx)
            });
            return Ok(RoundStep::Finished(ScenarioOutcome::NoRuleMatched));
        }

        for action_id in selection.action_ids() {
            let action = db.action(action_id)?;
            self.observers
                .notify("before_action", |o| o.before_action(ctx, action_id));
            action.apply(ctx.network_mut())?;
            ctx.record_action(action_id);
            self.observers
                .notify("after_action", |o| o.after_action(ctx, action_id));
        }
        Ok(RoundStep::Continue)
    }

    /// Try every triggered test action on a throw-away state. Returns
    /// `Some(NoViolations)` when a solving action was applied for real.
    fn run_tests(
        &mut self,
        ctx: &mut RunningContext<'_>,
        db: &ActionDb,
        violations: &[LimitViolation],
    ) -> GatResult<Option<ScenarioOutcome>> {
        let triggered = self.engine.triggered_tests(db.rules(), ctx, violations)?;

        for action_id in triggered {
            let action = db.action(&action_id)?;
            ctx.mark_tested(&action_id);
            self.observers
                .notify("before_test", |o| o.before_test(ctx, &action_id));

            let label = format!("{}-try-{}", ctx.scenario_label(), action_id);
            let trial = {
                let mut state = self.config.copy_strategy.create_state(ctx.network_mut(), &label)?;
                action.apply(&mut state)?;
                let result = self.load_flow.run(&mut state, &self.parameters)?;
                if result.is_ok() {
                    TrialOutcome::Converged(self.detector.detect(&state)?)
                } else {
                    TrialOutcome::Diverged
                }
            };

            self.observers
                .notify("after_test", |o| o.after_test(ctx, &action_id));

            match trial {
                TrialOutcome::Diverged => {
                    self.observers
                        .notify("diverged_after_test", |o| o.diverged_after_test(ctx, &action_id));
                }
                TrialOutcome::Converged(remaining) if !remaining.is_empty() => {
                    self.observers.notify("violations_after_test", |o| {
                        o.violations_after_test(ctx, &action_id, &remaining)
                    });
                }
                TrialOutcome::Converged(_) => {
                    self.observers.notify("no_more_violations_after_test", |o| {
                        o.no_more_violations_after_test(ctx, &action_id)
                    });
                    ctx.record_solving_test(&action_id);

                    if self.config.apply_if_solved_violations {
                        self.observers
                            .notify("before_action", |o| o.before_action(ctx, &action_id));
                        action.apply(ctx.network_mut())?;
                        ctx.record_action(&action_id);
                        self.observers
                            .notify("after_action", |o| o.after_action(ctx, &action_id));
                        return Ok(Some(ScenarioOutcome::NoViolations));
                    }
                }
            }
        }
        Ok(None)
    }
}
