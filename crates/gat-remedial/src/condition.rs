//! Side-effect free rule conditions.
//!
//! Conditions are plain data (serde-tagged) evaluated against the current
//! violations, the scenario network and the scenario timeline. Evaluating a
//! condition never mutates anything.

use gat_core::{
    EquipmentKind, GatResult, LimitViolation, LimitViolationKind, Network,
};
use serde::{Deserialize, Serialize};

/// Read-only view a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub network: &'a Network,
    /// `None` in the pre-contingency scenario.
    pub contingency_id: Option<&'a str>,
    /// Actions already applied in this scenario.
    pub timeline: &'a [String],
    pub violations: &'a [LimitViolation],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Condition {
    True,
    False,
    AnyViolation,
    ViolationOn { subject: String },
    ViolationOfKind { kind: LimitViolationKind },
    /// Any listed branch carries a current violation.
    IsOverloaded { branches: Vec<String> },
    /// Highest current / permanent limit ratio of the branch is at least `ratio`.
    LoadingAbove { branch: String, ratio: f64 },
    SwitchOpen { switch: String },
    ActionTaken { action: String },
    ContingencyIs { id: String },
    PreContingency,
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or { conditions }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    pub fn overloaded(branch: impl Into<String>) -> Self {
        Condition::IsOverloaded {
            branches: vec![branch.into()],
        }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> GatResult<bool> {
        Ok(match self {
            Condition::True => true,
            Condition::False => false,
            Condition::AnyViolation => !ctx.violations.is_empty(),
            Condition::ViolationOn { subject } => {
                ctx.violations.iter().any(|v| v.subject_id == *subject)
            }
            Condition::ViolationOfKind { kind } => ctx.violations.iter().any(|v| v.kind == *kind),
            Condition::IsOverloaded { branches } => {
                for branch in branches {
                    branch_exists(ctx.network, branch)?;
                }
                ctx.violations.iter().any(|v| {
                    v.kind == LimitViolationKind::Current
                        && branches.iter().any(|b| *b == v.subject_id)
                })
            }
            Condition::LoadingAbove { branch, ratio } => {
                loading(ctx.network, branch)?.is_some_and(|l| l >= *ratio)
            }
            Condition::SwitchOpen { switch } => {
                let sw = ctx.network.switch_id(switch)?;
                ctx.network.is_switch_open(sw)
            }
            Condition::ActionTaken { action } => ctx.timeline.iter().any(|a| a == action),
            Condition::ContingencyIs { id } => ctx.contingency_id == Some(id.as_str()),
            Condition::PreContingency => ctx.contingency_id.is_none(),
            Condition::And { conditions } => {
                for c in conditions {
                    if !c.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Or { conditions } => {
                for c in conditions {
                    if c.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not { condition } => !condition.evaluate(ctx)?,
        })
    }

    /// Resolve the network elements the condition references.
    pub fn validate(&self, network: &Network) -> GatResult<()> {
        match self {
            Condition::IsOverloaded { branches } => {
                for branch in branches {
                    branch_exists(network, branch)?;
                }
                Ok(())
            }
            Condition::LoadingAbove { branch, .. } => branch_exists(network, branch),
            Condition::SwitchOpen { switch } => network.switch_id(switch).map(|_| ()),
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().try_for_each(|c| c.validate(network))
            }
            Condition::Not { condition } => condition.validate(network),
            _ => Ok(()),
        }
    }

    /// Action ids referenced through `ActionTaken`.
    pub fn referenced_actions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_actions(&mut out);
        out
    }

    fn collect_actions<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::ActionTaken { action } => out.push(action.as_str()),
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().for_each(|c| c.collect_actions(out))
            }
            Condition::Not { condition } => condition.collect_actions(out),
            _ => {}
        }
    }
}

fn branch_exists(network: &Network, id: &str) -> GatResult<()> {
    network
        .equipment_of_kind(id, "Branch", EquipmentKind::is_branch)
        .map(|_| ())
}

/// Highest current / permanent limit ratio over the branch sides that carry
/// both a computed current and a limit.
fn loading(network: &Network, id: &str) -> GatResult<Option<f64>> {
    let eq = network.equipment_of_kind(id, "Branch", EquipmentKind::is_branch)?;
    let branch = network.equipment(eq);
    let ratio = branch
        .terminals
        .iter()
        .filter_map(|t| {
            let limit = branch.current_limit(network.terminal(*t).side)?;
            let i = network.terminal_flow(*t).i?;
            Some(i / limit)
        })
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));
    Ok(ratio)
}
