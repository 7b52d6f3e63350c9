//! Multi-variant state arena.
//!
//! Every mutable attribute of a [`Network`](crate::Network) lives in a
//! [`VariantState`]. States are stored in slots addressed by [`VariantIndex`];
//! a name map resolves string ids. Removed slots are recycled, so a long run
//! that opens and releases one scenario state per contingency keeps the arena
//! at a constant size.

use crate::units::{Amperes, Kilovolts, Megavars, Megawatts};
use crate::{GatError, GatResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Id of the variant every network starts with.
pub const INITIAL_VARIANT_ID: &str = "InitialState";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantIndex(usize);

impl VariantIndex {
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Steady-state flow at a terminal, written by the load flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalFlow {
    pub p: Option<Megawatts>,
    pub q: Option<Megavars>,
    pub i: Option<Amperes>,
}

/// Operating point of one piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Setpoint {
    None,
    Generator { target_p: Megawatts },
    Load { p0: Megawatts, q0: Megavars },
    Shunt { section_count: u32 },
    Transformer { tap_position: Option<i32> },
}

/// Mutable attributes of a network, one entry per structural element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantState {
    pub(crate) switch_open: Vec<bool>,
    pub(crate) terminal_connected: Vec<bool>,
    pub(crate) terminal_flows: Vec<TerminalFlow>,
    pub(crate) voltages: Vec<Option<Kilovolts>>,
    pub(crate) setpoints: Vec<Setpoint>,
}

impl VariantState {
    pub fn switch_open(&self) -> &[bool] {
        &self.switch_open
    }

    pub fn terminal_connected(&self) -> &[bool] {
        &self.terminal_connected
    }

    pub fn setpoints(&self) -> &[Setpoint] {
        &self.setpoints
    }
}

#[derive(Debug, Clone)]
struct Slot {
    id: String,
    state: VariantState,
}

#[derive(Debug, Clone)]
pub struct VariantArena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    names: HashMap<String, VariantIndex>,
    working: VariantIndex,
}

impl VariantArena {
    pub fn new(initial: VariantState) -> Self {
        let mut names = HashMap::new();
        names.insert(INITIAL_VARIANT_ID.to_string(), VariantIndex(0));
        Self {
            slots: vec![Some(Slot {
                id: INITIAL_VARIANT_ID.to_string(),
                state: initial,
            })],
            free: Vec::new(),
            names,
            working: VariantIndex(0),
        }
    }

    pub fn working(&self) -> VariantIndex {
        self.working
    }

    pub fn working_id(&self) -> &str {
        self.slot(self.working).id.as_str()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> GatResult<VariantIndex> {
        self.names
            .get(id)
            .copied()
            .ok_or_else(|| GatError::not_found("Variant", id))
    }

    /// Live variant ids in slot order.
    pub fn ids(&self) -> Vec<&str> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of allocated slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clone_variant(&mut self, source: &str, target: &str) -> GatResult<VariantIndex> {
        if self.names.contains_key(target) {
            return Err(GatError::Validation(format!(
                "Variant '{target}' already exists"
            )));
        }
        let source_index = self.index_of(source)?;
        let slot = Slot {
            id: target.to_string(),
            state: self.slot(source_index).state.clone(),
        };
        let index = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                VariantIndex(i)
            }
            None => {
                self.slots.push(Some(slot));
                VariantIndex(self.slots.len() - 1)
            }
        };
        self.names.insert(target.to_string(), index);
        Ok(index)
    }

    pub fn set_working(&mut self, id: &str) -> GatResult<()> {
        self.working = self.index_of(id)?;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> GatResult<()> {
        if id == INITIAL_VARIANT_ID {
            return Err(GatError::Validation(
                "The initial variant cannot be removed".into(),
            ));
        }
        let index = self.index_of(id)?;
        if index == self.working {
            return Err(GatError::Validation(format!(
                "Variant '{id}' is the working variant"
            )));
        }
        self.names.remove(id);
        self.slots[index.0] = None;
        self.free.push(index.0);
        Ok(())
    }

    pub fn state(&self, index: VariantIndex) -> &VariantState {
        &self.slot(index).state
    }

    pub fn working_state(&self) -> &VariantState {
        self.state(self.working)
    }

    pub fn working_state_mut(&mut self) -> &mut VariantState {
        let working = self.working.0;
        match self.slots[working].as_mut() {
            Some(slot) => &mut slot.state,
            None => unreachable!("working variant slot is always live"),
        }
    }

    fn slot(&self, index: VariantIndex) -> &Slot {
        match self.slots[index.0].as_ref() {
            Some(slot) => slot,
            None => unreachable!("variant index {} refers to a removed slot", index.0),
        }
    }
}
