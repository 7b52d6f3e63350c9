use crate::condition::Condition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Selected by the rule engine and applied to the scenario network.
    #[default]
    Standard,
    /// Its action is first tried on a throw-away copy of the scenario network.
    Test,
}

/// One entry of the rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// Lower values are evaluated first; ties keep table order.
    #[serde(default)]
    pub priority: i32,
    pub condition: Condition,
    /// Id of the action applied when the condition holds.
    pub action: String,
    /// Maximum number of matches per scenario. `None` is unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life: Option<u32>,
    #[serde(default)]
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(id: impl Into<String>, condition: Condition, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            condition,
            action: action.into(),
            life: None,
            kind: RuleKind::Standard,
        }
    }

    /// A test rule: its action is tried before standard rule selection.
    pub fn test(id: impl Into<String>, condition: Condition, action: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Test,
            ..Self::new(id, condition, action)
        }
    }

    pub fn with_life(mut self, life: u32) -> Self {
        self.life = Some(life);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_test(&self) -> bool {
        self.kind == RuleKind::Test
    }

    /// A rule that already matched `life` times is dead for the rest of the
    /// scenario.
    pub fn is_dead(&self, match_count: u32) -> bool {
        self.life.is_some_and(|life| match_count >= life)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleEvaluationStatus {
    True,
    False,
    Dead,
}

impl std::fmt::Display for RuleEvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RuleEvaluationStatus::True => "TRUE",
            RuleEvaluationStatus::False => "FALSE",
            RuleEvaluationStatus::Dead => "DEAD",
        })
    }
}
