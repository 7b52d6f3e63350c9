//! Rule selection.
//!
//! [`RuleEngine::select`] walks the standard rules in table order and reports
//! every evaluation it performed plus the matched actions. It reads the
//! context (network, timeline, rule match counts) and never mutates it; the
//! round controller records matches afterwards.

use crate::context::RunningContext;
use crate::rule::{Rule, RuleEvaluationStatus};
use gat_core::{GatResult, LimitViolation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How many rules can match in one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleMatchPolicy {
    /// Stop at the first rule whose condition holds; one action per round.
    #[default]
    FirstMatch,
    /// Evaluate every rule and apply each matched action once, in table order.
    AllMatching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEvaluation {
    pub rule_id: String,
    pub status: RuleEvaluationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_id: String,
    pub action_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSelection {
    /// In evaluation order. Rules after a first match are absent.
    pub evaluations: Vec<RuleEvaluation>,
    pub matches: Vec<RuleMatch>,
}

impl RuleSelection {
    pub fn is_match(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Distinct action ids of the matches, in table order.
    pub fn action_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.matches
            .iter()
            .map(|m| m.action_id.as_str())
            .filter(|a| seen.insert(*a))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine {
    policy: RuleMatchPolicy,
}

impl RuleEngine {
    pub fn new(policy: RuleMatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RuleMatchPolicy {
        self.policy
    }

    pub fn select(
        &self,
        rules: &[Rule],
        context: &RunningContext<'_>,
        violations: &[LimitViolation],
    ) -> GatResult<RuleSelection> {
        let eval_ctx = context.evaluation_context(violations);
        let mut selection = RuleSelection::default();

        for rule in rules.iter().filter(|r| !r.is_test()) {
            let status = if rule.is_dead(context.rule_match_count(&rule.id)) {
                RuleEvaluationStatus::Dead
            } else if rule.condition.evaluate(&eval_ctx)? {
                RuleEvaluationStatus::True
            } else {
                RuleEvaluationStatus::False
            };
            tracing::debug!(rule = %rule.id, %status, round = context.round(), "rule evaluated");

            selection.evaluations.push(RuleEvaluation {
                rule_id: rule.id.clone(),
                status,
            });
            if status == RuleEvaluationStatus::True {
                selection.matches.push(RuleMatch {
                    rule_id: rule.id.clone(),
                    action_id: rule.action.clone(),
                });
                if self.policy == RuleMatchPolicy::FirstMatch {
                    break;
                }
            }
        }
        Ok(selection)
    }

    /// Actions of the test rules whose condition holds, without duplicates and
    /// without the ones already tried in this scenario.
    pub fn triggered_tests(
        &self,
        rules: &[Rule],
        context: &RunningContext<'_>,
        violations: &[LimitViolation],
    ) -> GatResult<Vec<String>> {
        let eval_ctx = context.evaluation_context(violations);
        let mut actions: Vec<String> = Vec::new();
        for rule in rules.iter().filter(|r| r.is_test()) {
            if context.tested().contains(&rule.action) || actions.contains(&rule.action) {
                continue;
            }
            if rule.condition.evaluate(&eval_ctx)? {
                actions.push(rule.action.clone());
            }
        }
        Ok(actions)
    }
}
