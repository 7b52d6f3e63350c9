//! Network modifications carried by remedial actions.
//!
//! Every modification sets an absolute target (open, closed, a section count,
//! a setpoint value), so applying it twice leaves the network exactly as the
//! first application did.

use crate::contingency::ContingencyElement;
use crate::units::{Megavars, Megawatts};
use crate::variant::Setpoint;
use crate::{EquipmentId, EquipmentKind, GatError, GatResult, Network};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Modification {
    OpenSwitch {
        switch: String,
    },
    CloseSwitch {
        switch: String,
    },
    /// Connect every terminal of the equipment.
    ConnectEquipment {
        equipment: String,
    },
    DisconnectEquipment {
        equipment: String,
    },
    /// Isolate an element the way a contingency would.
    Trip {
        element: ContingencyElement,
    },
    SetLoad {
        load: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p0: Option<Megawatts>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        q0: Option<Megavars>,
    },
    SetGeneratorTargetP {
        generator: String,
        target_p: Megawatts,
    },
    SetShuntSections {
        shunt: String,
        section_count: u32,
    },
    SetTapPosition {
        transformer: String,
        position: i32,
    },
}

impl Modification {
    /// Resolve every referenced element without touching the network. Target
    /// values (section counts, tap positions) are checked by [`apply`].
    ///
    /// [`apply`]: Modification::apply
    pub fn validate(&self, network: &Network) -> GatResult<()> {
        match self {
            Modification::OpenSwitch { switch } | Modification::CloseSwitch { switch } => {
                network.switch_id(switch).map(|_| ())
            }
            Modification::ConnectEquipment { equipment }
            | Modification::DisconnectEquipment { equipment } => network
                .find_equipment(equipment)
                .map(|_| ())
                .ok_or_else(|| GatError::not_found("Equipment", equipment.as_str())),
            Modification::Trip { element } => element.resolve(network),
            Modification::SetLoad { load, .. } => find(network, load, EquipmentKind::Load).map(|_| ()),
            Modification::SetGeneratorTargetP { generator, .. } => {
                find(network, generator, EquipmentKind::Generator).map(|_| ())
            }
            Modification::SetShuntSections { shunt, .. } => {
                find(network, shunt, EquipmentKind::ShuntCompensator).map(|_| ())
            }
            Modification::SetTapPosition { transformer, .. } => {
                find(network, transformer, EquipmentKind::TwoWindingsTransformer).map(|_| ())
            }
        }
    }

    pub fn apply(&self, network: &mut Network) -> GatResult<()> {
        match self {
            Modification::OpenSwitch { switch } => {
                let sw = network.switch_id(switch)?;
                network.set_switch_open(sw, true);
            }
            Modification::CloseSwitch { switch } => {
                let sw = network.switch_id(switch)?;
                network.set_switch_open(sw, false);
            }
            Modification::ConnectEquipment { equipment } => {
                set_connected(network, equipment, true)?;
            }
            Modification::DisconnectEquipment { equipment } => {
                set_connected(network, equipment, false)?;
            }
            Modification::Trip { element } => {
                element.to_tripping().apply(network)?;
            }
            Modification::SetLoad { load, p0, q0 } => {
                let eq = find(network, load, EquipmentKind::Load)?;
                if let Setpoint::Load {
                    p0: current_p0,
                    q0: current_q0,
                } = network.setpoint_mut(eq)
                {
                    if let Some(p0) = p0 {
                        *current_p0 = *p0;
                    }
                    if let Some(q0) = q0 {
                        *current_q0 = *q0;
                    }
                }
            }
            Modification::SetGeneratorTargetP {
                generator,
                target_p,
            } => {
                let eq = find(network, generator, EquipmentKind::Generator)?;
                *network.setpoint_mut(eq) = Setpoint::Generator {
                    target_p: *target_p,
                };
            }
            Modification::SetShuntSections {
                shunt,
                section_count,
            } => {
                let eq = find(network, shunt, EquipmentKind::ShuntCompensator)?;
                check_sections(network, eq, *section_count)?;
                *network.setpoint_mut(eq) = Setpoint::Shunt {
                    section_count: *section_count,
                };
            }
            Modification::SetTapPosition {
                transformer,
                position,
            } => {
                let eq = find(network, transformer, EquipmentKind::TwoWindingsTransformer)?;
                check_tap(network, eq, *position)?;
                *network.setpoint_mut(eq) = Setpoint::Transformer {
                    tap_position: Some(*position),
                };
            }
        }
        Ok(())
    }

    /// Short human-readable form, used in logs.
    pub fn describe(&self) -> String {
        match self {
            Modification::OpenSwitch { switch } => format!("open switch {switch}"),
            Modification::CloseSwitch { switch } => format!("close switch {switch}"),
            Modification::ConnectEquipment { equipment } => format!("connect {equipment}"),
            Modification::DisconnectEquipment { equipment } => format!("disconnect {equipment}"),
            Modification::Trip { element } => format!("trip {}", element.id()),
            Modification::SetLoad { load, p0, q0 } => {
                let mut parts = Vec::new();
                if let Some(p0) = p0 {
                    parts.push(format!("p0={p0}"));
                }
                if let Some(q0) = q0 {
                    parts.push(format!("q0={q0}"));
                }
                format!("set load {load} {}", parts.join(" "))
            }
            Modification::SetGeneratorTargetP {
                generator,
                target_p,
            } => format!("set generator {generator} target p={target_p}"),
            Modification::SetShuntSections {
                shunt,
                section_count,
            } => format!("set shunt {shunt} sections={section_count}"),
            Modification::SetTapPosition {
                transformer,
                position,
            } => format!("set transformer {transformer} tap={position}"),
        }
    }
}

fn find(network: &Network, id: &str, kind: EquipmentKind) -> GatResult<EquipmentId> {
    network.equipment_of_kind(id, kind.as_str(), |k| k == kind)
}

fn set_connected(network: &mut Network, id: &str, connected: bool) -> GatResult<()> {
    let eq = network
        .find_equipment(id)
        .ok_or_else(|| GatError::not_found("Equipment", id))?;
    let terminals = network.equipment(eq).terminals.clone();
    for t in terminals {
        network.set_terminal_connected(t, connected);
    }
    Ok(())
}

fn check_sections(network: &Network, eq: EquipmentId, section_count: u32) -> GatResult<()> {
    let shunt = network.equipment(eq);
    let max = shunt.max_section_count.unwrap_or(0);
    if section_count > max {
        return Err(GatError::Validation(format!(
            "Section count {section_count} of shunt '{}' exceeds maximum {max}",
            shunt.id
        )));
    }
    Ok(())
}

fn check_tap(network: &Network, eq: EquipmentId, position: i32) -> GatResult<()> {
    let transformer = network.equipment(eq);
    match transformer.tap_range {
        Some((low, high)) if (low..=high).contains(&position) => Ok(()),
        Some((low, high)) => Err(GatError::Validation(format!(
            "Tap position {position} of '{}' outside [{low}, {high}]",
            transformer.id
        ))),
        None => Err(GatError::Validation(format!(
            "Transformer '{}' has no tap changer",
            transformer.id
        ))),
    }
}
