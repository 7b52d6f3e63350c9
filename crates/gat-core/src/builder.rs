//! Incremental construction of a [`Network`].
//!
//! Every `add_*` call validates its input immediately (duplicate ids, wrong
//! attachment kind for the voltage level topology, unknown voltage level), so
//! a malformed model is rejected before any simulation starts. [`build`]
//! assembles the connectivity graph once.
//!
//! [`build`]: NetworkBuilder::build

use crate::units::{Amperes, Kilovolts, Megavars, Megawatts};
use crate::variant::{Setpoint, TerminalFlow, VariantState};
use crate::{
    Bus, BusId, ConnectionPoint, Equipment, EquipmentId, EquipmentKind, GatError, GatResult, Link,
    Network, NetworkStructure, Side, Switch, SwitchId, SwitchKind, Terminal, TerminalId,
    TopologyKind, Vertex, VoltageLevel, VoltageLevelId,
};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;

/// Switch definition for [`NetworkBuilder::add_switch`].
#[derive(Debug, Clone)]
pub struct SwitchSpec {
    pub id: String,
    pub kind: SwitchKind,
    pub end1: ConnectionPoint,
    pub end2: ConnectionPoint,
    pub open: bool,
    pub fictitious: bool,
}

impl SwitchSpec {
    pub fn new(
        id: impl Into<String>,
        kind: SwitchKind,
        end1: ConnectionPoint,
        end2: ConnectionPoint,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            end1,
            end2,
            open: false,
            fictitious: false,
        }
    }

    /// Breaker between two nodes of a node/breaker voltage level.
    pub fn breaker(id: impl Into<String>, node1: u32, node2: u32) -> Self {
        Self::new(
            id,
            SwitchKind::Breaker,
            ConnectionPoint::Node(node1),
            ConnectionPoint::Node(node2),
        )
    }

    pub fn disconnector(id: impl Into<String>, node1: u32, node2: u32) -> Self {
        Self::new(
            id,
            SwitchKind::Disconnector,
            ConnectionPoint::Node(node1),
            ConnectionPoint::Node(node2),
        )
    }

    pub fn opened(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn fictitious(mut self) -> Self {
        self.fictitious = true;
        self
    }
}

/// Where a terminal attaches, and whether it starts connected.
#[derive(Debug, Clone, Copy)]
pub struct Attach {
    pub voltage_level: VoltageLevelId,
    pub point: ConnectionPoint,
    pub connected: bool,
}

impl Attach {
    pub fn node(voltage_level: VoltageLevelId, node: u32) -> Self {
        Self {
            voltage_level,
            point: ConnectionPoint::Node(node),
            connected: true,
        }
    }

    pub fn bus(voltage_level: VoltageLevelId, bus: BusId) -> Self {
        Self {
            voltage_level,
            point: ConnectionPoint::Bus(bus),
            connected: true,
        }
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }
}

#[derive(Debug, Default)]
pub struct NetworkBuilder {
    id: String,
    voltage_levels: Vec<VoltageLevel>,
    buses: Vec<Bus>,
    switches: Vec<Switch>,
    switch_open: Vec<bool>,
    terminals: Vec<Terminal>,
    terminal_connected: Vec<bool>,
    equipment: Vec<Equipment>,
    setpoints: Vec<Setpoint>,
    voltage_level_index: HashMap<String, VoltageLevelId>,
    bus_index: HashMap<String, BusId>,
    switch_index: HashMap<String, SwitchId>,
    equipment_index: HashMap<String, EquipmentId>,
}

impl NetworkBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn add_voltage_level(&mut self, voltage_level: VoltageLevel) -> GatResult<VoltageLevelId> {
        if self.voltage_level_index.contains_key(&voltage_level.id) {
            return Err(duplicate("Voltage level", &voltage_level.id));
        }
        let id = VoltageLevelId::new(self.voltage_levels.len());
        self.voltage_level_index.insert(voltage_level.id.clone(), id);
        self.voltage_levels.push(voltage_level);
        Ok(id)
    }

    pub fn add_bus(&mut self, voltage_level: VoltageLevelId, id: &str) -> GatResult<BusId> {
        let vl = self.voltage_level_ref(voltage_level)?;
        if vl.topology_kind != TopologyKind::BusBreaker {
            return Err(GatError::Validation(format!(
                "Bus '{id}' requires a bus/breaker voltage level, '{}' is node/breaker",
                vl.id
            )));
        }
        if self.bus_index.contains_key(id) {
            return Err(duplicate("Bus", id));
        }
        let bus = BusId::new(self.buses.len());
        self.bus_index.insert(id.to_string(), bus);
        self.buses.push(Bus {
            id: id.to_string(),
            voltage_level,
        });
        Ok(bus)
    }

    pub fn add_switch(&mut self, voltage_level: VoltageLevelId, spec: SwitchSpec) -> GatResult<SwitchId> {
        if self.switch_index.contains_key(&spec.id) {
            return Err(duplicate("Switch", &spec.id));
        }
        self.check_point(voltage_level, spec.end1, &spec.id)?;
        self.check_point(voltage_level, spec.end2, &spec.id)?;
        let id = SwitchId::new(self.switches.len());
        self.switch_index.insert(spec.id.clone(), id);
        self.switch_open.push(spec.open);
        self.switches.push(Switch {
            id: spec.id,
            voltage_level,
            kind: spec.kind,
            fictitious: spec.fictitious,
            end1: spec.end1,
            end2: spec.end2,
        });
        Ok(id)
    }

    pub fn add_line(&mut self, id: &str, side1: Attach, side2: Attach) -> GatResult<EquipmentId> {
        self.add_equipment(id, EquipmentKind::Line, &[side1, side2], Setpoint::None)
    }

    pub fn add_two_windings_transformer(
        &mut self,
        id: &str,
        side1: Attach,
        side2: Attach,
    ) -> GatResult<EquipmentId> {
        self.add_equipment(
            id,
            EquipmentKind::TwoWindingsTransformer,
            &[side1, side2],
            Setpoint::Transformer { tap_position: None },
        )
    }

    pub fn add_three_windings_transformer(
        &mut self,
        id: &str,
        side1: Attach,
        side2: Attach,
        side3: Attach,
    ) -> GatResult<EquipmentId> {
        self.add_equipment(
            id,
            EquipmentKind::ThreeWindingsTransformer,
            &[side1, side2, side3],
            Setpoint::None,
        )
    }

    pub fn add_generator(&mut self, id: &str, at: Attach, target_p_mw: f64) -> GatResult<EquipmentId> {
        self.add_equipment(
            id,
            EquipmentKind::Generator,
            &[at],
            Setpoint::Generator {
                target_p: Megawatts(target_p_mw),
            },
        )
    }

    pub fn add_load(&mut self, id: &str, at: Attach, p0_mw: f64, q0_mvar: f64) -> GatResult<EquipmentId> {
        self.add_equipment(
            id,
            EquipmentKind::Load,
            &[at],
            Setpoint::Load {
                p0: Megawatts(p0_mw),
                q0: Megavars(q0_mvar),
            },
        )
    }

    pub fn add_shunt(
        &mut self,
        id: &str,
        at: Attach,
        max_section_count: u32,
        section_count: u32,
    ) -> GatResult<EquipmentId> {
        if section_count > max_section_count {
            return Err(GatError::Validation(format!(
                "Shunt '{id}': section count {section_count} exceeds maximum {max_section_count}"
            )));
        }
        let eq = self.add_equipment(
            id,
            EquipmentKind::ShuntCompensator,
            &[at],
            Setpoint::Shunt { section_count },
        )?;
        self.equipment[eq.value()].max_section_count = Some(max_section_count);
        Ok(eq)
    }

    /// Permanent current limits in amperes, one per side.
    pub fn set_current_limits(&mut self, equipment: EquipmentId, limits_a: &[Option<f64>]) -> GatResult<()> {
        let eq = self.equipment_mut(equipment)?;
        if limits_a.len() != eq.terminals.len() {
            return Err(GatError::Validation(format!(
                "'{}' has {} sides, got {} current limits",
                eq.id,
                eq.terminals.len(),
                limits_a.len()
            )));
        }
        eq.current_limits = limits_a.iter().map(|l| l.map(Amperes)).collect();
        Ok(())
    }

    pub fn set_tap_changer(
        &mut self,
        equipment: EquipmentId,
        low: i32,
        high: i32,
        position: i32,
    ) -> GatResult<()> {
        let eq = self.equipment_mut(equipment)?;
        if eq.kind != EquipmentKind::TwoWindingsTransformer {
            return Err(GatError::Validation(format!(
                "'{}' is not a two windings transformer",
                eq.id
            )));
        }
        if low > high || position < low || position > high {
            return Err(GatError::Validation(format!(
                "'{}': invalid tap changer [{low}, {high}] at {position}",
                eq.id
            )));
        }
        eq.tap_range = Some((low, high));
        self.setpoints[equipment.value()] = Setpoint::Transformer {
            tap_position: Some(position),
        };
        Ok(())
    }

    pub fn build(self) -> GatResult<Network> {
        let mut graph: UnGraph<Vertex, Link> = UnGraph::new_undirected();
        let mut points: HashMap<(VoltageLevelId, ConnectionPoint), NodeIndex> = HashMap::new();
        let mut point_vertex = |graph: &mut UnGraph<Vertex, Link>, vl, point| {
            *points
                .entry((vl, point))
                .or_insert_with(|| graph.add_node(Vertex::Point { voltage_level: vl, point }))
        };

        for (i, sw) in self.switches.iter().enumerate() {
            let a = point_vertex(&mut graph, sw.voltage_level, sw.end1);
            let b = point_vertex(&mut graph, sw.voltage_level, sw.end2);
            graph.add_edge(a, b, Link::Switch(SwitchId::new(i)));
        }

        let mut terminal_vertices = Vec::with_capacity(self.terminals.len());
        for (i, terminal) in self.terminals.iter().enumerate() {
            let tv = graph.add_node(Vertex::Terminal(TerminalId::new(i)));
            let pv = point_vertex(&mut graph, terminal.voltage_level, terminal.point);
            graph.add_edge(tv, pv, Link::Attachment);
            terminal_vertices.push(tv);
        }

        // every pair of sides is linked, so a traversal stopping at one side
        // still reaches the others
        for (i, eq) in self.equipment.iter().enumerate() {
            for (a, ta) in eq.terminals.iter().enumerate() {
                for tb in &eq.terminals[a + 1..] {
                    graph.add_edge(
                        terminal_vertices[ta.value()],
                        terminal_vertices[tb.value()],
                        Link::Equipment(EquipmentId::new(i)),
                    );
                }
            }
        }

        tracing::debug!(
            network = %self.id,
            voltage_levels = self.voltage_levels.len(),
            switches = self.switches.len(),
            equipment = self.equipment.len(),
            "built network connectivity graph"
        );

        let initial = VariantState {
            switch_open: self.switch_open,
            terminal_connected: self.terminal_connected,
            terminal_flows: vec![TerminalFlow::default(); self.terminals.len()],
            voltages: vec![None::<Kilovolts>; self.voltage_levels.len()],
            setpoints: self.setpoints,
        };
        let structure = NetworkStructure {
            voltage_levels: self.voltage_levels,
            buses: self.buses,
            switches: self.switches,
            terminals: self.terminals,
            equipment: self.equipment,
            graph,
            terminal_vertices,
            voltage_level_index: self.voltage_level_index,
            switch_index: self.switch_index,
            equipment_index: self.equipment_index,
        };
        Ok(Network::from_parts(self.id, structure, initial))
    }

    fn add_equipment(
        &mut self,
        id: &str,
        kind: EquipmentKind,
        sides: &[Attach],
        setpoint: Setpoint,
    ) -> GatResult<EquipmentId> {
        if self.equipment_index.contains_key(id) {
            return Err(duplicate(kind.as_str(), id));
        }
        for at in sides {
            self.check_point(at.voltage_level, at.point, id)?;
        }
        let eq = EquipmentId::new(self.equipment.len());
        let mut terminals = Vec::with_capacity(sides.len());
        for (i, at) in sides.iter().enumerate() {
            let t = TerminalId::new(self.terminals.len());
            self.terminals.push(Terminal {
                equipment: eq,
                side: Side::from_index(i),
                voltage_level: at.voltage_level,
                point: at.point,
            });
            self.terminal_connected.push(at.connected);
            terminals.push(t);
        }
        self.equipment_index.insert(id.to_string(), eq);
        self.equipment.push(Equipment {
            id: id.to_string(),
            kind,
            terminals,
            current_limits: vec![None; sides.len()],
            max_section_count: None,
            tap_range: None,
        });
        self.setpoints.push(setpoint);
        Ok(eq)
    }

    fn check_point(&self, vl: VoltageLevelId, point: ConnectionPoint, owner: &str) -> GatResult<()> {
        let level = self.voltage_level_ref(vl)?;
        match (level.topology_kind, point) {
            (TopologyKind::NodeBreaker, ConnectionPoint::Node(_)) => Ok(()),
            (TopologyKind::BusBreaker, ConnectionPoint::Bus(bus)) => {
                match self.buses.get(bus.value()) {
                    Some(b) if b.voltage_level == vl => Ok(()),
                    _ => Err(GatError::Validation(format!(
                        "'{owner}': bus {} does not belong to voltage level '{}'",
                        bus.value(),
                        level.id
                    ))),
                }
            }
            (kind, _) => Err(GatError::Validation(format!(
                "'{owner}': connection point does not match {kind:?} voltage level '{}'",
                level.id
            ))),
        }
    }

    fn voltage_level_ref(&self, vl: VoltageLevelId) -> GatResult<&VoltageLevel> {
        self.voltage_levels
            .get(vl.value())
            .ok_or_else(|| GatError::not_found("Voltage level", vl.value().to_string()))
    }

    fn equipment_mut(&mut self, eq: EquipmentId) -> GatResult<&mut Equipment> {
        self.equipment
            .get_mut(eq.value())
            .ok_or_else(|| GatError::not_found("Equipment", eq.value().to_string()))
    }
}

fn duplicate(kind: &str, id: &str) -> GatError {
    GatError::Validation(format!("{kind} '{id}' already exists"))
}
