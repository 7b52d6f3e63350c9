//! Cascading-disconnection traversal.
//!
//! Computes which switches must be opened and which terminals disconnected to
//! isolate a piece of equipment, the way protection would clear a fault:
//!
//! - a terminal in a bus/breaker voltage level is disconnected (if currently
//!   connected) and traversal stops there, since that representation does not
//!   model the internal switch structure;
//! - in a node/breaker voltage level traversal continues through nodes, across
//!   equipment, and through closed switches, except that a closed
//!   non-fictitious breaker is recorded for opening and not crossed;
//! - an open switch is never crossed.
//!
//! Traversal never mutates the network. [`Tripping::apply`] computes the union
//! over all starting terminals first and only then opens and disconnects.

use crate::{
    EquipmentId, EquipmentKind, GatError, GatResult, Link, Network, SwitchId, TerminalId,
    TopologyKind, Vertex,
};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Switches to open and terminals to disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrippingResult {
    pub switches_to_open: BTreeSet<SwitchId>,
    pub terminals_to_disconnect: BTreeSet<TerminalId>,
}

impl TrippingResult {
    pub fn is_empty(&self) -> bool {
        self.switches_to_open.is_empty() && self.terminals_to_disconnect.is_empty()
    }

    pub fn merge(&mut self, other: TrippingResult) {
        self.switches_to_open.extend(other.switches_to_open);
        self.terminals_to_disconnect
            .extend(other.terminals_to_disconnect);
    }

    pub fn apply(&self, network: &mut Network) {
        for sw in &self.switches_to_open {
            network.set_switch_open(*sw, true);
        }
        for t in &self.terminals_to_disconnect {
            network.set_terminal_connected(*t, false);
        }
    }

    /// Ids of the switches to open, for logging.
    pub fn switch_names<'a>(&self, network: &'a Network) -> Vec<&'a str> {
        self.switches_to_open
            .iter()
            .map(|s| network.switch(*s).id.as_str())
            .collect()
    }
}

/// Traverse from one terminal. `skip_equipment` is not crossed.
pub fn traverse_from_terminal(
    network: &Network,
    start: TerminalId,
    skip_equipment: Option<EquipmentId>,
) -> TrippingResult {
    let mut result = TrippingResult::default();
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut stack = vec![network.terminal_vertex(start)];

    while let Some(vertex) = stack.pop() {
        if !visited.insert(vertex) {
            continue;
        }
        if let Vertex::Terminal(t) = network.graph()[vertex] {
            let vl = network.terminal(t).voltage_level;
            if network.voltage_level(vl).topology_kind == TopologyKind::BusBreaker {
                if network.is_terminal_connected(t) {
                    result.terminals_to_disconnect.insert(t);
                }
                continue;
            }
        }

        for edge in network.graph().edges(vertex) {
            let next = if edge.source() == vertex {
                edge.target()
            } else {
                edge.source()
            };
            if visited.contains(&next) {
                continue;
            }
            match *edge.weight() {
                Link::Attachment => stack.push(next),
                Link::Equipment(eq) => {
                    if Some(eq) != skip_equipment {
                        stack.push(next);
                    }
                }
                Link::Switch(sw) => {
                    if network.is_switch_open(sw) {
                        continue;
                    }
                    let switch = network.switch(sw);
                    if switch.is_breaker() && !switch.fictitious {
                        result.switches_to_open.insert(sw);
                    } else {
                        stack.push(next);
                    }
                }
            }
        }
    }
    result
}

/// An equipment outage, as a set of starting terminals for the traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Tripping {
    /// Line or two-winding transformer; with `voltage_level`, only that side
    /// is tripped.
    Branch {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voltage_level: Option<String>,
    },
    /// Generator, load or shunt compensator.
    Injection { id: String },
    ThreeWindingsTransformer { id: String },
}

impl Tripping {
    pub fn branch(id: impl Into<String>) -> Self {
        Tripping::Branch {
            id: id.into(),
            voltage_level: None,
        }
    }

    pub fn injection(id: impl Into<String>) -> Self {
        Tripping::Injection { id: id.into() }
    }

    pub fn equipment_id(&self) -> &str {
        match self {
            Tripping::Branch { id, .. }
            | Tripping::Injection { id }
            | Tripping::ThreeWindingsTransformer { id } => id,
        }
    }

    fn resolve(&self, network: &Network) -> GatResult<EquipmentId> {
        match self {
            Tripping::Branch { id, .. } => {
                network.equipment_of_kind(id, "Branch", EquipmentKind::is_branch)
            }
            Tripping::Injection { id } => {
                network.equipment_of_kind(id, "Injection", EquipmentKind::is_injection)
            }
            Tripping::ThreeWindingsTransformer { id } => network.equipment_of_kind(
                id,
                "Three windings transformer",
                |k| k == EquipmentKind::ThreeWindingsTransformer,
            ),
        }
    }

    /// Terminals the traversal starts from.
    pub fn starting_terminals(&self, network: &Network) -> GatResult<Vec<TerminalId>> {
        let eq = self.resolve(network)?;
        let terminals = &network.equipment(eq).terminals;
        match self {
            Tripping::Branch {
                id,
                voltage_level: Some(vl),
            } => {
                let side: Vec<TerminalId> = terminals
                    .iter()
                    .copied()
                    .filter(|t| network.voltage_level(network.terminal(*t).voltage_level).id == *vl)
                    .collect();
                if side.is_empty() {
                    return Err(GatError::Validation(format!(
                        "VoltageLevel '{vl}' not connected to branch '{id}'"
                    )));
                }
                Ok(side)
            }
            _ => Ok(terminals.clone()),
        }
    }

    pub fn traverse(&self, network: &Network) -> GatResult<TrippingResult> {
        let starts = self.starting_terminals(network)?;
        let skip = match self {
            Tripping::Branch {
                voltage_level: Some(_),
                ..
            } => Some(self.resolve(network)?),
            _ => None,
        };
        let mut result = TrippingResult::default();
        for t in starts {
            result.merge(traverse_from_terminal(network, t, skip));
        }
        Ok(result)
    }

    pub fn apply(&self, network: &mut Network) -> GatResult<TrippingResult> {
        let result = self.traverse(network)?;
        tracing::debug!(
            equipment = %self.equipment_id(),
            switches = ?result.switch_names(network),
            terminals = result.terminals_to_disconnect.len(),
            "tripping"
        );
        result.apply(network);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn switches(network: &Network, names: &[&str]) -> BTreeSet<SwitchId> {
        names.iter().map(|n| network.switch_id(n).unwrap()).collect()
    }

    fn terminal(network: &Network, eq: &str, side: usize) -> TerminalId {
        let eq = network.find_equipment(eq).unwrap();
        network.equipment(eq).terminals[side]
    }

    #[test]
    fn test_bus_breaker_terminal_stops_traversal() {
        let network = fixtures::two_level_network();
        let start = terminal(&network, "LOAD_1", 0);
        let result = traverse_from_terminal(&network, start, None);
        assert!(result.switches_to_open.is_empty());
        assert_eq!(
            result.terminals_to_disconnect,
            BTreeSet::from([start])
        );
    }

    #[test]
    fn test_disconnected_bus_breaker_terminal_is_skipped() {
        let mut network = fixtures::two_level_network();
        let start = terminal(&network, "LOAD_1", 0);
        network.set_terminal_connected(start, false);
        assert!(traverse_from_terminal(&network, start, None).is_empty());
    }

    #[test]
    fn test_breaker_stops_and_disconnector_is_traversed() {
        let network = fixtures::two_level_network();
        let start = terminal(&network, "LINE_1", 0);
        let result = traverse_from_terminal(&network, start, None);

        // DISC_LINE_1 is crossed, BR_LINE_1 is recorded and not crossed,
        // the far side in the bus/breaker level is disconnected.
        assert_eq!(result.switches_to_open, switches(&network, &["BR_LINE_1"]));
        assert_eq!(
            result.terminals_to_disconnect,
            BTreeSet::from([terminal(&network, "LINE_1", 1)])
        );
    }

    #[test]
    fn test_fictitious_breaker_is_traversed() {
        let network = fixtures::two_level_network();
        let result = Tripping::injection("GEN_1").traverse(&network).unwrap();
        assert_eq!(result.switches_to_open, switches(&network, &["BR_GEN_1"]));
        assert!(result.terminals_to_disconnect.is_empty());
    }

    #[test]
    fn test_open_switch_is_not_traversed() {
        let network = fixtures::two_level_network();
        let result = Tripping::injection("LOAD_NB").traverse(&network).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_traversal_is_idempotent() {
        let network = fixtures::two_level_network();
        let tripping = Tripping::branch("LINE_1");
        let first = tripping.traverse(&network).unwrap();
        let second = tripping.traverse(&network).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_apply_and_reapply() {
        let mut network = fixtures::two_level_network();
        let tripping = Tripping::branch("LINE_1");
        let applied = tripping.apply(&mut network).unwrap();
        assert!(!applied.is_empty());

        let br = network.switch_id("BR_LINE_1").unwrap();
        assert!(network.is_switch_open(br));
        assert!(!network.is_terminal_connected(terminal(&network, "LINE_1", 1)));

        // Nothing left to isolate the second time.
        assert!(tripping.apply(&mut network).unwrap().is_empty());
    }

    #[test]
    fn test_voltage_level_filter() {
        let network = fixtures::two_level_network();
        let tripping = Tripping::Branch {
            id: "LINE_1".into(),
            voltage_level: Some("VL_BB".into()),
        };
        let result = tripping.traverse(&network).unwrap();
        assert!(result.switches_to_open.is_empty());
        assert_eq!(result.terminals_to_disconnect.len(), 1);

        let bad = Tripping::Branch {
            id: "LINE_1".into(),
            voltage_level: Some("VL_LV".into()),
        };
        assert!(matches!(
            bad.traverse(&network),
            Err(GatError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_equipment() {
        let network = fixtures::two_level_network();
        let err = Tripping::branch("UNKNOWN").traverse(&network).unwrap_err();
        assert_eq!(err.to_string(), "Branch 'UNKNOWN' not found");
        // a load is not a branch
        assert!(Tripping::branch("LOAD_1").traverse(&network).is_err());
    }

    #[test]
    fn test_three_windings_transformer() {
        let network = fixtures::two_level_network();
        let tripping = Tripping::ThreeWindingsTransformer { id: "TR3".into() };
        let result = tripping.traverse(&network).unwrap();
        assert_eq!(result.switches_to_open, switches(&network, &["BR_TR3"]));
        assert_eq!(result.terminals_to_disconnect.len(), 2);
    }
}
