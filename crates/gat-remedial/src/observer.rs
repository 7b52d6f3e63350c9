//! Observer bus.
//!
//! The round controller reports every lifecycle point to the registered
//! [`SimulatorObserver`]s, synchronously and in registration order. A
//! panicking observer is caught and logged; the simulation carries on.

use crate::context::RunningContext;
use crate::outcome::ScenarioOutcome;
use crate::rule::RuleEvaluationStatus;
use gat_core::{LimitViolation, LoadFlowResult};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Lifecycle callbacks. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait SimulatorObserver: Send {
    /// Name used when reporting a faulty observer.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn before_pre_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {}

    fn after_pre_contingency_analysis(&mut self) {}

    fn before_post_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {}

    /// The contingency has been applied to the scenario network.
    fn post_contingency_analysis_network_loaded(&mut self, ctx: &RunningContext<'_>) {}

    fn after_post_contingency_analysis(&mut self) {}

    fn round_begin(&mut self, ctx: &RunningContext<'_>) {}

    fn round_end(&mut self, ctx: &RunningContext<'_>) {}

    fn load_flow_converged(&mut self, ctx: &RunningContext<'_>, violations: &[LimitViolation]) {}

    fn load_flow_diverged(&mut self, ctx: &RunningContext<'_>, result: &LoadFlowResult) {}

    fn no_more_violations(&mut self, ctx: &RunningContext<'_>) {}

    fn violations_but_no_rule_matched(&mut self, ctx: &RunningContext<'_>) {}

    fn max_rounds_reached(&mut self, ctx: &RunningContext<'_>) {}

    fn rule_evaluated(&mut self, ctx: &RunningContext<'_>, rule_id: &str, status: RuleEvaluationStatus) {}

    fn before_action(&mut self, ctx: &RunningContext<'_>, action_id: &str) {}

    fn after_action(&mut self, ctx: &RunningContext<'_>, action_id: &str) {}

    fn before_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {}

    fn after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {}

    fn no_more_violations_after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {}

    fn violations_after_test(
        &mut self,
        ctx: &RunningContext<'_>,
        action_id: &str,
        violations: &[LimitViolation],
    ) {
    }

    fn diverged_after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {}

    /// Last event of every scenario.
    fn scenario_finished(&mut self, ctx: &RunningContext<'_>, outcome: ScenarioOutcome) {}
}

#[derive(Default)]
pub struct ObserverBus {
    observers: Vec<Box<dyn SimulatorObserver>>,
}

impl std::fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("ObserverBus").field("observers", &names).finish()
    }
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn SimulatorObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Invoke `f` on every observer in registration order.
    pub fn notify<F>(&mut self, event: &'static str, mut f: F)
    where
        F: FnMut(&mut dyn SimulatorObserver),
    {
        for observer in self.observers.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| f(observer.as_mut())));
            if let Err(panic) = outcome {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    observer = observer.name(),
                    event,
                    %message,
                    "observer panicked; ignoring"
                );
            }
        }
    }
}
