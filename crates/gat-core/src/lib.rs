//! # gat-core: Grid model for remedial-action simulation
//!
//! Provides the network model the simulator mutates while it replays
//! contingencies and remedial actions.
//!
//! ## Design Philosophy
//!
//! A [`Network`] is split in two halves:
//!
//! - **Structure** ([`NetworkStructure`]): voltage levels, buses, switches,
//!   terminals and equipment, plus the connectivity graph built once with
//!   petgraph. Immutable and shared behind an `Arc`.
//! - **Variants** ([`variant::VariantArena`]): every mutable attribute
//!   (switch positions, terminal connection flags, load-flow results,
//!   setpoints) lives in an arena of state slots addressed by small integer
//!   indices. Cloning a variant duplicates only these vectors.
//!
//! Voltage levels use one of two topology representations
//! ([`TopologyKind`]): detailed node/breaker, where equipment attaches to
//! numbered nodes wired together by switches, or simplified bus/breaker, where
//! equipment attaches directly to configured buses.
//!
//! ## Quick Start
//!
//! ```rust
//! use gat_core::*;
//!
//! let mut b = NetworkBuilder::new("demo");
//! let vl = b.add_voltage_level(VoltageLevel::new("VL1", 400.0, TopologyKind::NodeBreaker)).unwrap();
//! b.add_switch(vl, SwitchSpec::breaker("BR1", 0, 1)).unwrap();
//! b.add_load("LD1", Attach::node(vl, 1), 50.0, 10.0).unwrap();
//! b.add_generator("G1", Attach::node(vl, 0), 50.0).unwrap();
//! let network = b.build().unwrap();
//!
//! let br = network.switch_id("BR1").unwrap();
//! assert!(!network.is_switch_open(br));
//! ```
//!
//! ## Modules
//!
//! - [`topology`] - tripping traversal (switches to open, terminals to disconnect)
//! - [`variant`] - multi-variant state arena
//! - [`contingency`] - contingency definitions lowered to trippings
//! - [`modification`] - idempotent network modifications used by actions
//! - [`limits`] - limit-violation detection
//! - [`solver`] - load-flow trait and registry

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub mod builder;
pub mod contingency;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod limits;
pub mod modification;
pub mod snapshot;
pub mod solver;
pub mod topology;
pub mod units;
pub mod variant;

pub use builder::{Attach, NetworkBuilder, SwitchSpec};
pub use contingency::{Contingency, ContingencyElement};
pub use error::{GatError, GatResult, PartitionFailure};
pub use limits::{
    format_violations, LimitViolation, LimitViolationDetector, LimitViolationKind,
    ViolationDetector, ViolationFilter,
};
pub use modification::Modification;
pub use snapshot::NetworkSnapshot;
pub use solver::*;
pub use topology::{Tripping, TrippingResult};
pub use units::{Amperes, Kilovolts, Megavars, MegavoltAmperes, Megawatts};
pub use variant::{Setpoint, TerminalFlow, VariantIndex, VariantState, INITIAL_VARIANT_ID};

macro_rules! index_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub fn new(value: usize) -> Self {
                $name(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

// Positional handles into the network structure. Only valid for the network
// (or deep copy of the network) that produced them.
index_id!(VoltageLevelId);
index_id!(BusId);
index_id!(SwitchId);
index_id!(TerminalId);
index_id!(EquipmentId);

/// Topology representation used by a voltage level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyKind {
    /// Detailed representation: numbered nodes wired by switches.
    NodeBreaker,
    /// Simplified representation: equipment attaches to configured buses and the
    /// internal switch structure is not modeled.
    BusBreaker,
}

/// Where a terminal or a switch end is attached inside its voltage level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionPoint {
    Node(u32),
    Bus(BusId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageLevel {
    pub id: String,
    /// Nominal voltage (used for base voltage filtering of violations)
    pub nominal_v: Kilovolts,
    pub topology_kind: TopologyKind,
    pub low_voltage_limit: Option<Kilovolts>,
    pub high_voltage_limit: Option<Kilovolts>,
}

impl VoltageLevel {
    pub fn new(id: impl Into<String>, nominal_kv: f64, topology_kind: TopologyKind) -> Self {
        Self {
            id: id.into(),
            nominal_v: Kilovolts(nominal_kv),
            topology_kind,
            low_voltage_limit: None,
            high_voltage_limit: None,
        }
    }

    /// Attach voltage limits in kV.
    pub fn with_voltage_limits(mut self, low_kv: Option<f64>, high_kv: Option<f64>) -> Self {
        self.low_voltage_limit = low_kv.map(Kilovolts);
        self.high_voltage_limit = high_kv.map(Kilovolts);
        self
    }
}

/// Configured bus of a bus/breaker voltage level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: String,
    pub voltage_level: VoltageLevelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchKind {
    Breaker,
    Disconnector,
    LoadBreakSwitch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    pub id: String,
    pub voltage_level: VoltageLevelId,
    pub kind: SwitchKind,
    /// Fictitious switches model topology artifacts and are never operated.
    pub fictitious: bool,
    pub end1: ConnectionPoint,
    pub end2: ConnectionPoint,
}

impl Switch {
    pub fn is_breaker(&self) -> bool {
        self.kind == SwitchKind::Breaker
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    One,
    Two,
    Three,
}

impl Side {
    pub fn from_index(index: usize) -> Side {
        match index {
            0 => Side::One,
            1 => Side::Two,
            _ => Side::Three,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
            Side::Three => 2,
        }
    }
}

/// Equipment connection point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Terminal {
    pub equipment: EquipmentId,
    pub side: Side,
    pub voltage_level: VoltageLevelId,
    pub point: ConnectionPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipmentKind {
    Line,
    TwoWindingsTransformer,
    ThreeWindingsTransformer,
    Generator,
    Load,
    ShuntCompensator,
}

impl EquipmentKind {
    /// Lines and two-winding transformers.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            EquipmentKind::Line | EquipmentKind::TwoWindingsTransformer
        )
    }

    /// Single-terminal equipment.
    pub fn is_injection(self) -> bool {
        matches!(
            self,
            EquipmentKind::Generator | EquipmentKind::Load | EquipmentKind::ShuntCompensator
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentKind::Line => "Line",
            EquipmentKind::TwoWindingsTransformer => "Two windings transformer",
            EquipmentKind::ThreeWindingsTransformer => "Three windings transformer",
            EquipmentKind::Generator => "Generator",
            EquipmentKind::Load => "Load",
            EquipmentKind::ShuntCompensator => "Shunt compensator",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub kind: EquipmentKind,
    /// One terminal per side, in side order.
    pub terminals: Vec<TerminalId>,
    /// Permanent current limit per side.
    pub current_limits: Vec<Option<Amperes>>,
    /// Shunt compensators only.
    pub max_section_count: Option<u32>,
    /// Tap changer bounds (inclusive), transformers only.
    pub tap_range: Option<(i32, i32)>,
}

impl Equipment {
    pub fn current_limit(&self, side: Side) -> Option<Amperes> {
        self.current_limits.get(side.index()).copied().flatten()
    }
}

/// Vertex of the connectivity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vertex {
    Point {
        voltage_level: VoltageLevelId,
        point: ConnectionPoint,
    },
    Terminal(TerminalId),
}

/// Edge of the connectivity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Switch(SwitchId),
    /// Terminal to the node or bus it is attached to.
    Attachment,
    /// Between two terminals of the same equipment.
    Equipment(EquipmentId),
}

/// Immutable part of a network, shared by every variant.
#[derive(Debug, Clone)]
pub struct NetworkStructure {
    pub(crate) voltage_levels: Vec<VoltageLevel>,
    pub(crate) buses: Vec<Bus>,
    pub(crate) switches: Vec<Switch>,
    pub(crate) terminals: Vec<Terminal>,
    pub(crate) equipment: Vec<Equipment>,
    pub(crate) graph: UnGraph<Vertex, Link>,
    pub(crate) terminal_vertices: Vec<NodeIndex>,
    pub(crate) voltage_level_index: HashMap<String, VoltageLevelId>,
    pub(crate) switch_index: HashMap<String, SwitchId>,
    pub(crate) equipment_index: HashMap<String, EquipmentId>,
}

/// A grid model: shared structure plus a set of named state variants.
///
/// All state accessors read and write the *working* variant.
#[derive(Debug, Clone)]
pub struct Network {
    id: String,
    structure: Arc<NetworkStructure>,
    variants: variant::VariantArena,
}

impl Network {
    pub(crate) fn from_parts(
        id: String,
        structure: NetworkStructure,
        initial: VariantState,
    ) -> Self {
        Self {
            id,
            structure: Arc::new(structure),
            variants: variant::VariantArena::new(initial),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // ----------------------------------------------------------------------
    // Structure
    // ----------------------------------------------------------------------

    pub fn voltage_level(&self, id: VoltageLevelId) -> &VoltageLevel {
        &self.structure.voltage_levels[id.0]
    }

    pub fn voltage_levels(&self) -> impl Iterator<Item = (VoltageLevelId, &VoltageLevel)> {
        self.structure
            .voltage_levels
            .iter()
            .enumerate()
            .map(|(i, vl)| (VoltageLevelId(i), vl))
    }

    pub fn voltage_level_id(&self, id: &str) -> GatResult<VoltageLevelId> {
        self.structure
            .voltage_level_index
            .get(id)
            .copied()
            .ok_or_else(|| GatError::not_found("Voltage level", id))
    }

    pub fn bus(&self, id: BusId) -> &Bus {
        &self.structure.buses[id.0]
    }

    pub fn switch(&self, id: SwitchId) -> &Switch {
        &self.structure.switches[id.0]
    }

    pub fn switches(&self) -> impl Iterator<Item = (SwitchId, &Switch)> {
        self.structure
            .switches
            .iter()
            .enumerate()
            .map(|(i, sw)| (SwitchId(i), sw))
    }

    pub fn switch_id(&self, id: &str) -> GatResult<SwitchId> {
        self.structure
            .switch_index
            .get(id)
            .copied()
            .ok_or_else(|| GatError::not_found("Switch", id))
    }

    pub fn terminal(&self, id: TerminalId) -> &Terminal {
        &self.structure.terminals[id.0]
    }

    pub fn terminal_count(&self) -> usize {
        self.structure.terminals.len()
    }

    pub fn equipment(&self, id: EquipmentId) -> &Equipment {
        &self.structure.equipment[id.0]
    }

    pub fn equipments(&self) -> impl Iterator<Item = (EquipmentId, &Equipment)> {
        self.structure
            .equipment
            .iter()
            .enumerate()
            .map(|(i, eq)| (EquipmentId(i), eq))
    }

    pub fn find_equipment(&self, id: &str) -> Option<EquipmentId> {
        self.structure.equipment_index.get(id).copied()
    }

    /// Looks up an equipment and checks its kind; `kind_label` is used in the
    /// not-found message (e.g. "Branch", "Generator").
    pub fn equipment_of_kind(
        &self,
        id: &str,
        kind_label: &'static str,
        accepts: impl Fn(EquipmentKind) -> bool,
    ) -> GatResult<EquipmentId> {
        match self.find_equipment(id) {
            Some(eq) if accepts(self.equipment(eq).kind) => Ok(eq),
            _ => Err(GatError::not_found(kind_label, id)),
        }
    }

    pub fn graph(&self) -> &UnGraph<Vertex, Link> {
        &self.structure.graph
    }

    pub fn terminal_vertex(&self, id: TerminalId) -> NodeIndex {
        self.structure.terminal_vertices[id.0]
    }

    /// True when both networks share the same immutable structure.
    pub fn shares_structure_with(&self, other: &Network) -> bool {
        Arc::ptr_eq(&self.structure, &other.structure)
    }

    // ----------------------------------------------------------------------
    // Variants
    // ----------------------------------------------------------------------

    pub fn working_variant_id(&self) -> &str {
        self.variants.working_id()
    }

    pub fn working_variant(&self) -> VariantIndex {
        self.variants.working()
    }

    pub fn variant_ids(&self) -> Vec<&str> {
        self.variants.ids()
    }

    pub fn has_variant(&self, id: &str) -> bool {
        self.variants.contains(id)
    }

    /// Copy the mutable state of `source` into a new slot named `target`.
    pub fn clone_variant(&mut self, source: &str, target: &str) -> GatResult<VariantIndex> {
        self.variants.clone_variant(source, target)
    }

    pub fn set_working_variant(&mut self, id: &str) -> GatResult<()> {
        self.variants.set_working(id)
    }

    pub fn remove_variant(&mut self, id: &str) -> GatResult<()> {
        self.variants.remove(id)
    }

    pub fn variant_state(&self, index: VariantIndex) -> &VariantState {
        self.variants.state(index)
    }

    /// Fully independent copy: fresh structure, and a single initial variant
    /// holding the current working state.
    pub fn deep_copy(&self) -> Network {
        Network {
            id: self.id.clone(),
            structure: Arc::new(NetworkStructure::clone(&self.structure)),
            variants: variant::VariantArena::new(self.variants.working_state().clone()),
        }
    }

    fn state(&self) -> &VariantState {
        self.variants.working_state()
    }

    fn state_mut(&mut self) -> &mut VariantState {
        self.variants.working_state_mut()
    }

    // ----------------------------------------------------------------------
    // Working variant state
    // ----------------------------------------------------------------------

    pub fn is_switch_open(&self, id: SwitchId) -> bool {
        self.state().switch_open[id.0]
    }

    pub fn set_switch_open(&mut self, id: SwitchId, open: bool) {
        self.state_mut().switch_open[id.0] = open;
    }

    pub fn is_terminal_connected(&self, id: TerminalId) -> bool {
        self.state().terminal_connected[id.0]
    }

    pub fn set_terminal_connected(&mut self, id: TerminalId, connected: bool) {
        self.state_mut().terminal_connected[id.0] = connected;
    }

    pub fn terminal_flow(&self, id: TerminalId) -> &TerminalFlow {
        &self.state().terminal_flows[id.0]
    }

    pub fn set_terminal_flow(&mut self, id: TerminalId, flow: TerminalFlow) {
        self.state_mut().terminal_flows[id.0] = flow;
    }

    pub fn voltage(&self, id: VoltageLevelId) -> Option<Kilovolts> {
        self.state().voltages[id.0]
    }

    pub fn set_voltage(&mut self, id: VoltageLevelId, v: Option<Kilovolts>) {
        self.state_mut().voltages[id.0] = v;
    }

    pub fn setpoint(&self, id: EquipmentId) -> &Setpoint {
        &self.state().setpoints[id.0]
    }

    pub fn setpoint_mut(&mut self, id: EquipmentId) -> &mut Setpoint {
        &mut self.state_mut().setpoints[id.0]
    }

    /// Forget load-flow results of the working variant.
    pub fn clear_results(&mut self) {
        let state = self.state_mut();
        state
            .terminal_flows
            .iter_mut()
            .for_each(|flow| *flow = TerminalFlow::default());
        state.voltages.iter_mut().for_each(|v| *v = None);
    }

    /// All terminals of an equipment are connected.
    pub fn is_equipment_connected(&self, id: EquipmentId) -> bool {
        self.equipment(id)
            .terminals
            .iter()
            .all(|t| self.is_terminal_connected(*t))
    }
}
