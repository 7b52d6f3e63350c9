//! Serializable view of a network's working variant, used when exporting cases.

use crate::variant::{Setpoint, TerminalFlow};
use crate::{EquipmentKind, Network, Side, SwitchKind, TopologyKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub network_id: String,
    pub variant_id: String,
    pub voltage_levels: Vec<VoltageLevelSnapshot>,
    pub switches: Vec<SwitchSnapshot>,
    pub equipment: Vec<EquipmentSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageLevelSnapshot {
    pub id: String,
    pub nominal_v: f64,
    pub topology_kind: TopologyKind,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchSnapshot {
    pub id: String,
    pub kind: SwitchKind,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalSnapshot {
    pub side: Side,
    pub connected: bool,
    #[serde(flatten)]
    pub flow: TerminalFlow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSnapshot {
    pub id: String,
    pub kind: EquipmentKind,
    pub terminals: Vec<TerminalSnapshot>,
    pub setpoint: Setpoint,
}

impl NetworkSnapshot {
    pub fn capture(network: &Network) -> Self {
        let voltage_levels = network
            .voltage_levels()
            .map(|(id, vl)| VoltageLevelSnapshot {
                id: vl.id.clone(),
                nominal_v: vl.nominal_v.value(),
                topology_kind: vl.topology_kind,
                v: network.voltage(id).map(|v| v.value()),
            })
            .collect();
        let switches = network
            .switches()
            .map(|(id, sw)| SwitchSnapshot {
                id: sw.id.clone(),
                kind: sw.kind,
                open: network.is_switch_open(id),
            })
            .collect();
        let equipment = network
            .equipments()
            .map(|(id, eq)| EquipmentSnapshot {
                id: eq.id.clone(),
                kind: eq.kind,
                terminals: eq
                    .terminals
                    .iter()
                    .map(|t| TerminalSnapshot {
                        side: network.terminal(*t).side,
                        connected: network.is_terminal_connected(*t),
                        flow: network.terminal_flow(*t).clone(),
                    })
                    .collect(),
                setpoint: network.setpoint(id).clone(),
            })
            .collect();

        Self {
            network_id: network.id().to_string(),
            variant_id: network.working_variant_id().to_string(),
            voltage_levels,
            switches,
            equipment,
        }
    }

    pub fn switch(&self, id: &str) -> Option<&SwitchSnapshot> {
        self.switches.iter().find(|s| s.id == id)
    }
}
