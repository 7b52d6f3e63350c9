//! Contingency definitions.
//!
//! A contingency is a named list of outaged elements. Each element lowers to a
//! [`Tripping`]; applying the contingency unions the traversal of every element
//! before anything is opened or disconnected.

use crate::topology::{Tripping, TrippingResult};
use crate::{EquipmentKind, GatError, GatResult, Network};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContingencyElement {
    Branch {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voltage_level: Option<String>,
    },
    Generator { id: String },
    Load { id: String },
    ShuntCompensator { id: String },
    ThreeWindingsTransformer { id: String },
}

impl ContingencyElement {
    pub fn id(&self) -> &str {
        match self {
            ContingencyElement::Branch { id, .. }
            | ContingencyElement::Generator { id }
            | ContingencyElement::Load { id }
            | ContingencyElement::ShuntCompensator { id }
            | ContingencyElement::ThreeWindingsTransformer { id } => id,
        }
    }

    /// Check the element exists with the expected kind.
    pub fn resolve(&self, network: &Network) -> GatResult<()> {
        let kind = match self {
            ContingencyElement::Generator { id } => Some((id, EquipmentKind::Generator, "Generator")),
            ContingencyElement::Load { id } => Some((id, EquipmentKind::Load, "Load")),
            ContingencyElement::ShuntCompensator { id } => {
                Some((id, EquipmentKind::ShuntCompensator, "Shunt compensator"))
            }
            _ => None,
        };
        if let Some((id, expected, label)) = kind {
            network.equipment_of_kind(id, label, |k| k == expected)?;
        }
        self.to_tripping().starting_terminals(network).map(|_| ())
    }

    pub fn to_tripping(&self) -> Tripping {
        match self {
            ContingencyElement::Branch { id, voltage_level } => Tripping::Branch {
                id: id.clone(),
                voltage_level: voltage_level.clone(),
            },
            ContingencyElement::Generator { id }
            | ContingencyElement::Load { id }
            | ContingencyElement::ShuntCompensator { id } => Tripping::Injection { id: id.clone() },
            ContingencyElement::ThreeWindingsTransformer { id } => {
                Tripping::ThreeWindingsTransformer { id: id.clone() }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contingency {
    pub id: String,
    pub elements: Vec<ContingencyElement>,
}

impl Contingency {
    pub fn new(id: impl Into<String>, elements: Vec<ContingencyElement>) -> Self {
        Self {
            id: id.into(),
            elements,
        }
    }

    /// Single-branch contingency named after the branch.
    pub fn branch(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            id.clone(),
            vec![ContingencyElement::Branch {
                id,
                voltage_level: None,
            }],
        )
    }

    /// Check every element resolves against the network.
    pub fn validate(&self, network: &Network) -> GatResult<()> {
        if self.elements.is_empty() {
            return Err(GatError::Validation(format!(
                "Contingency '{}' has no element",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id()) {
                return Err(GatError::Validation(format!(
                    "Contingency '{}' lists '{}' twice",
                    self.id,
                    element.id()
                )));
            }
            element.resolve(network)?;
        }
        Ok(())
    }

    pub fn traverse(&self, network: &Network) -> GatResult<TrippingResult> {
        let mut result = TrippingResult::default();
        for element in &self.elements {
            result.merge(element.to_tripping().traverse(network)?);
        }
        Ok(result)
    }

    /// Apply the contingency to the working variant.
    pub fn apply(&self, network: &mut Network) -> GatResult<TrippingResult> {
        let result = self.traverse(network)?;
        tracing::debug!(
            contingency = %self.id,
            switches = ?result.switch_names(network),
            terminals = result.terminals_to_disconnect.len(),
            "applying contingency"
        );
        result.apply(network);
        Ok(result)
    }
}
