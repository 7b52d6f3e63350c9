//! Actions and the action database.
//!
//! An [`ActionDb`] bundles the contingencies, the remedial actions and the
//! rule table of one study. It is plain data, typically loaded from JSON:
//!
//! ```json
//! {
//!   "contingencies": [{"id": "LINE_1", "elements": [{"type": "branch", "id": "LINE_1"}]}],
//!   "actions": [{"id": "shed", "modifications": [{"type": "set-load", "load": "LOAD_1", "p0": 600.0}]}],
//!   "rules": [{"id": "r1", "condition": {"type": "is-overloaded", "branches": ["LINE_2"]}, "action": "shed"}]
//! }
//! ```

use crate::rule::Rule;
use gat_core::{Contingency, GatError, GatResult, Modification, Network};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub modifications: Vec<Modification>,
}

impl Action {
    pub fn new(id: impl Into<String>, modifications: Vec<Modification>) -> Self {
        Self {
            id: id.into(),
            description: None,
            modifications,
        }
    }

    pub fn validate(&self, network: &Network) -> GatResult<()> {
        self.modifications
            .iter()
            .try_for_each(|m| m.validate(network))
    }

    /// Apply every modification in order. Failures are wrapped in
    /// [`GatError::ActionApplication`].
    pub fn apply(&self, network: &mut Network) -> GatResult<()> {
        for modification in &self.modifications {
            tracing::debug!(action = %self.id, modification = %modification.describe(), "applying");
            modification
                .apply(network)
                .map_err(|source| GatError::ActionApplication {
                    action: self.id.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ActionDbFile {
    #[serde(default)]
    contingencies: Vec<Contingency>,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Contingencies, actions and the rule table. Rules are kept sorted by
/// priority (stable, so equal priorities keep table order).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ActionDbFile")]
pub struct ActionDb {
    contingencies: Vec<Contingency>,
    actions: Vec<Action>,
    rules: Vec<Rule>,
}

impl From<ActionDbFile> for ActionDb {
    fn from(file: ActionDbFile) -> Self {
        ActionDb::new(file.contingencies, file.actions, file.rules)
    }
}

impl ActionDb {
    pub fn new(contingencies: Vec<Contingency>, actions: Vec<Action>, mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self {
            contingencies,
            actions,
            rules,
        }
    }

    pub fn from_json(json: &str) -> GatResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> GatResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| {
            GatError::Parse(format!("{}: {e}", path.display()))
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn contingencies(&self) -> &[Contingency] {
        &self.contingencies
    }

    pub fn contingency_ids(&self) -> Vec<String> {
        self.contingencies.iter().map(|c| c.id.clone()).collect()
    }

    pub fn action(&self, id: &str) -> GatResult<&Action> {
        self.actions
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| GatError::not_found("Action", id))
    }

    pub fn contingency(&self, id: &str) -> GatResult<&Contingency> {
        self.contingencies
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| GatError::not_found("Contingency", id))
    }

    /// Fail-fast checks run before any round: unique ids, rule references,
    /// and every network element referenced by contingencies, actions and
    /// conditions.
    pub fn validate(&self, network: &Network) -> GatResult<()> {
        unique("Contingency", self.contingencies.iter().map(|c| c.id.as_str()))?;
        unique("Action", self.actions.iter().map(|a| a.id.as_str()))?;
        unique("Rule", self.rules.iter().map(|r| r.id.as_str()))?;

        for contingency in &self.contingencies {
            contingency.validate(network)?;
        }
        for action in &self.actions {
            action.validate(network)?;
        }
        for rule in &self.rules {
            self.action(&rule.action).map_err(|_| {
                GatError::Validation(format!(
                    "Rule '{}' references unknown action '{}'",
                    rule.id, rule.action
                ))
            })?;
            for referenced in rule.condition.referenced_actions() {
                self.action(referenced)?;
            }
            rule.condition.validate(network)?;
        }
        Ok(())
    }
}

fn unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> GatResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(GatError::Validation(format!("{kind} '{id}' is defined twice")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use gat_core::fixtures;

    const DB: &str = r#"{
        "contingencies": [{"id": "LINE_1", "elements": [{"type": "branch", "id": "LINE_1"}]}],
        "actions": [
            {"id": "shed", "modifications": [{"type": "set-load", "load": "LOAD_1", "p0": 600.0}]},
            {"id": "couple", "modifications": [{"type": "close-switch", "switch": "COUPLER"}]}
        ],
        "rules": [
            {"id": "late", "priority": 5, "condition": {"type": "true"}, "action": "couple"},
            {"id": "r1", "condition": {"type": "is-overloaded", "branches": ["LINE_2"]}, "action": "shed"},
            {"id": "r2", "condition": {"type": "any-violation"}, "action": "couple"}
        ]
    }"#;

    #[test]
    fn test_rules_sorted_by_priority_keep_table_order() {
        let db = ActionDb::from_json(DB).unwrap();
        let ids: Vec<_> = db.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "late"]);
        assert!(db.validate(&fixtures::two_level_network()).is_ok());
    }

    #[test]
    fn test_lookups() {
        let db = ActionDb::from_json(DB).unwrap();
        assert_eq!(db.contingency_ids(), vec!["LINE_1"]);
        assert!(db.action("shed").is_ok());
        assert_eq!(
            db.contingency("nope").unwrap_err().to_string(),
            "Contingency 'nope' not found"
        );
    }

    #[test]
    fn test_validate_rejects_dangling_references() {
        let network = fixtures::two_level_network();
        let db = ActionDb::new(
            vec![],
            vec![],
            vec![Rule::new("r1", Condition::True, "missing")],
        );
        assert!(matches!(db.validate(&network), Err(GatError::Validation(_))));

        let db = ActionDb::new(
            vec![],
            vec![Action::new(
                "a",
                vec![Modification::OpenSwitch {
                    switch: "UNKNOWN".into(),
                }],
            )],
            vec![],
        );
        assert_eq!(
            db.validate(&network).unwrap_err().to_string(),
            "Switch 'UNKNOWN' not found"
        );

        let db = ActionDb::new(
            vec![Contingency::branch("NOPE")],
            vec![],
            vec![],
        );
        assert!(db.validate(&network).unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let network = fixtures::two_level_network();
        let db = ActionDb::new(
            vec![],
            vec![Action::new("a", vec![]), Action::new("a", vec![])],
            vec![],
        );
        assert!(db.validate(&network).is_err());
    }

    #[test]
    fn test_apply_wraps_errors() {
        let mut network = fixtures::two_level_network();
        let action = Action::new(
            "too_many_sections",
            vec![Modification::SetShuntSections {
                shunt: "SHUNT_1".into(),
                section_count: 9,
            }],
        );
        let err = action.apply(&mut network).unwrap_err();
        assert!(matches!(err, GatError::ActionApplication { ref action, .. } if action == "too_many_sections"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.json");
        std::fs::write(&path, DB).unwrap();
        let db = ActionDb::load(&path).unwrap();
        assert_eq!(db.actions().len(), 2);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(ActionDb::load(&path), Err(GatError::Parse(_))));
    }
}
