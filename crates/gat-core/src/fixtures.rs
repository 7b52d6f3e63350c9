//! Shared test networks and deterministic load flows.
//!
//! [`two_level_network`] is a 400 kV node/breaker substation feeding a 400 kV
//! bus/breaker substation through two parallel lines, plus a 63 kV bus/breaker
//! level behind a two-winding and a three-winding transformer:
//!
//! ```text
//!  VL_NB (node/breaker)                       VL_BB (bus/breaker)
//!  node0 ─BR_LINE_1─ 1 ─DISC_LINE_1─ 2 ══ LINE_1 ══ B1 ─ LOAD_1
//!        ─BR_LINE_2─ 3 ─DISC_LINE_2─ 4 ══ LINE_2 ══ B2 ─ SHUNT_1
//!        ─BR_GEN_1 ─ 5 ─FICT_GEN_1 ─ 6 ── GEN_1      B1 ─COUPLER─ B2
//!        ─BR_TR    ─ 7 ══ TR_1 ══ B3 (VL_LV) ─ LOAD_2
//!        ─BR_TR3   ─ 11 ══ TR3 ══ B2 (VL_BB), B3 (VL_LV)
//!        ─BR_LOAD_NB (open) ─ 10 ── LOAD_NB
//! ```
//!
//! [`FeederLoadFlow`] shares LOAD_1 evenly over the energized lines, which
//! makes "trip one line, overload the other" scenarios cheap to express.

use crate::solver::{LoadFlow, LoadFlowParameters, LoadFlowResult, LoadFlowStatus};
use crate::units::{Amperes, Megavars, Megawatts};
use crate::variant::{Setpoint, TerminalFlow};
use crate::{
    Attach, EquipmentKind, GatError, GatResult, Link, Network, NetworkBuilder, SwitchKind,
    SwitchSpec, TerminalId, TopologyKind, Vertex, VoltageLevel,
};
use petgraph::visit::EdgeRef;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Permanent current limit of both lines.
pub const LINE_LIMIT_A: f64 = 1000.0;

pub fn two_level_network() -> Network {
    match build_two_level_network() {
        Ok(network) => network,
        Err(e) => panic!("fixture network is invalid: {e}"),
    }
}

fn build_two_level_network() -> GatResult<Network> {
    let mut b = NetworkBuilder::new("two-level");
    let nb = b.add_voltage_level(
        VoltageLevel::new("VL_NB", 400.0, TopologyKind::NodeBreaker)
            .with_voltage_limits(Some(380.0), Some(420.0)),
    )?;
    let bb = b.add_voltage_level(
        VoltageLevel::new("VL_BB", 400.0, TopologyKind::BusBreaker)
            .with_voltage_limits(Some(380.0), Some(420.0)),
    )?;
    let lv = b.add_voltage_level(VoltageLevel::new("VL_LV", 63.0, TopologyKind::BusBreaker))?;

    let b1 = b.add_bus(bb, "B1")?;
    let b2 = b.add_bus(bb, "B2")?;
    let b3 = b.add_bus(lv, "B3")?;

    b.add_switch(nb, SwitchSpec::breaker("BR_LINE_1", 0, 1))?;
    b.add_switch(nb, SwitchSpec::disconnector("DISC_LINE_1", 1, 2))?;
    b.add_switch(nb, SwitchSpec::breaker("BR_LINE_2", 0, 3))?;
    b.add_switch(nb, SwitchSpec::disconnector("DISC_LINE_2", 3, 4))?;
    b.add_switch(nb, SwitchSpec::breaker("BR_GEN_1", 0, 5))?;
    b.add_switch(nb, SwitchSpec::breaker("FICT_GEN_1", 5, 6).fictitious())?;
    b.add_switch(nb, SwitchSpec::breaker("BR_TR", 0, 7))?;
    b.add_switch(nb, SwitchSpec::breaker("BR_LOAD_NB", 0, 10).opened())?;
    b.add_switch(nb, SwitchSpec::breaker("BR_TR3", 0, 11))?;
    b.add_switch(
        bb,
        SwitchSpec::new(
            "COUPLER",
            SwitchKind::Breaker,
            crate::ConnectionPoint::Bus(b1),
            crate::ConnectionPoint::Bus(b2),
        ),
    )?;

    let line1 = b.add_line("LINE_1", Attach::node(nb, 2), Attach::bus(bb, b1))?;
    let line2 = b.add_line("LINE_2", Attach::node(nb, 4), Attach::bus(bb, b2))?;
    b.set_current_limits(line1, &[Some(LINE_LIMIT_A), Some(LINE_LIMIT_A)])?;
    b.set_current_limits(line2, &[Some(LINE_LIMIT_A), Some(LINE_LIMIT_A)])?;

    let tr = b.add_two_windings_transformer("TR_1", Attach::node(nb, 7), Attach::bus(lv, b3))?;
    b.set_tap_changer(tr, -5, 5, 0)?;
    b.add_three_windings_transformer(
        "TR3",
        Attach::node(nb, 11),
        Attach::bus(bb, b2),
        Attach::bus(lv, b3),
    )?;

    b.add_generator("GEN_1", Attach::node(nb, 6), 1000.0)?;
    b.add_load("LOAD_1", Attach::bus(bb, b1), 900.0, 0.0)?;
    b.add_load("LOAD_2", Attach::bus(lv, b3), 20.0, 5.0)?;
    b.add_load("LOAD_NB", Attach::node(nb, 10), 0.0, 0.0)?;
    b.add_shunt("SHUNT_1", Attach::bus(bb, b2), 3, 0)?;
    b.build()
}

/// Deterministic stand-in for a real solver, tailored to
/// [`two_level_network`].
///
/// LOAD_1 is shared evenly by LINE_1 and LINE_2 when they are energized
/// (node/breaker side connected to a connected generator through closed
/// switches, bus/breaker side connected). With no energized line and a
/// non-zero load, the load flow fails. Every voltage level is set to its
/// nominal voltage.
#[derive(Debug, Default)]
pub struct FeederLoadFlow {
    calls: AtomicUsize,
}

impl FeederLoadFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `run` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LoadFlow for FeederLoadFlow {
    fn name(&self) -> &str {
        "feeder"
    }

    fn run(&self, network: &mut Network, _parameters: &LoadFlowParameters) -> GatResult<LoadFlowResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        network.clear_results();

        let load = network.equipment_of_kind("LOAD_1", "Load", |k| k == EquipmentKind::Load)?;
        let (p, q) = match network.setpoint(load) {
            Setpoint::Load { p0, q0 } if network.is_equipment_connected(load) => (*p0, *q0),
            Setpoint::Load { .. } => (Megawatts(0.0), Megavars(0.0)),
            other => {
                return Err(GatError::Solver(format!(
                    "LOAD_1 has unexpected setpoint {other:?}"
                )))
            }
        };

        let mut energized = Vec::new();
        for name in ["LINE_1", "LINE_2"] {
            let line = network.equipment_of_kind(name, "Branch", EquipmentKind::is_branch)?;
            let terminals = network.equipment(line).terminals.clone();
            if terminals.iter().all(|t| is_energized(network, *t)) {
                energized.push(terminals);
            }
        }

        if energized.is_empty() {
            if p.value() > 0.0 {
                return Ok(LoadFlowResult::failed().with_metric("reason", "LOAD_1 is islanded"));
            }
        } else {
            let n = energized.len() as f64;
            let v = network.voltage_level(network.terminal(energized[0][0]).voltage_level).nominal_v;
            let (p_line, q_line) = (p / n, q / n);
            let i = Amperes::from_power(p_line, q_line, v);
            for terminals in &energized {
                network.set_terminal_flow(
                    terminals[0],
                    TerminalFlow {
                        p: Some(p_line),
                        q: Some(q_line),
                        i: Some(i),
                    },
                );
                network.set_terminal_flow(
                    terminals[1],
                    TerminalFlow {
                        p: Some(-p_line),
                        q: Some(-q_line),
                        i: Some(i),
                    },
                );
            }
        }

        let levels: Vec<_> = network
            .voltage_levels()
            .map(|(id, vl)| (id, vl.nominal_v))
            .collect();
        for (id, v) in levels {
            network.set_voltage(id, Some(v));
        }

        Ok(LoadFlowResult {
            status: LoadFlowStatus::Converged,
            metrics: Default::default(),
        }
        .with_metric("iterations", 1))
    }
}

/// A terminal is energized when it is connected and, in node/breaker
/// levels, reaches a connected generator through closed switches.
fn is_energized(network: &Network, terminal: TerminalId) -> bool {
    if !network.is_terminal_connected(terminal) {
        return false;
    }
    let vl = network.terminal(terminal).voltage_level;
    if network.voltage_level(vl).topology_kind == TopologyKind::BusBreaker {
        return true;
    }

    let mut visited = HashSet::new();
    let mut stack = vec![network.terminal_vertex(terminal)];
    while let Some(vertex) = stack.pop() {
        if !visited.insert(vertex) {
            continue;
        }
        if let Vertex::Terminal(t) = network.graph()[vertex] {
            let eq = network.equipment(network.terminal(t).equipment);
            if eq.kind == EquipmentKind::Generator && network.is_terminal_connected(t) {
                return true;
            }
        }
        for edge in network.graph().edges(vertex) {
            let next = if edge.source() == vertex {
                edge.target()
            } else {
                edge.source()
            };
            let passable = match *edge.weight() {
                Link::Attachment => true,
                Link::Switch(sw) => !network.is_switch_open(sw),
                Link::Equipment(_) => false,
            };
            if passable {
                stack.push(next);
            }
        }
    }
    false
}

/// Load flow driven by a closure, for tests that need full control over the
/// outcome of each run.
pub struct ScriptedLoadFlow<F> {
    script: F,
    calls: AtomicUsize,
}

impl<F> ScriptedLoadFlow<F>
where
    F: Fn(&mut Network, usize) -> GatResult<LoadFlowResult> + Send + Sync,
{
    /// `script` receives the network and the zero-based call number.
    pub fn new(script: F) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> LoadFlow for ScriptedLoadFlow<F>
where
    F: Fn(&mut Network, usize) -> GatResult<LoadFlowResult> + Send + Sync,
{
    fn name(&self) -> &str {
        "scripted"
    }

    fn run(&self, network: &mut Network, _parameters: &LoadFlowParameters) -> GatResult<LoadFlowResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(network, call)
    }
}
