//! Per-scenario state isolation.

use gat_core::{GatResult, Network};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// How a scenario gets its own copy of the network state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStrategy {
    /// Independent clone of structure and working state.
    #[default]
    #[serde(rename = "deep")]
    DeepCopy,
    /// New variant slot in the same network, sharing the structure.
    #[serde(rename = "state")]
    Variant,
}

impl CopyStrategy {
    /// Open an isolated state derived from the current working state of
    /// `network`. The state is released when the returned guard drops.
    pub fn create_state<'a>(&self, network: &'a mut Network, label: &str) -> GatResult<ScenarioNetwork<'a>> {
        match self {
            CopyStrategy::DeepCopy => {
                tracing::trace!(label, "deep copy of network state");
                Ok(ScenarioNetwork::Deep {
                    network: network.deep_copy(),
                    label: label.to_string(),
                })
            }
            CopyStrategy::Variant => {
                let previous = network.working_variant_id().to_string();
                network.clone_variant(&previous, label)?;
                if let Err(e) = network.set_working_variant(label) {
                    let _ = network.remove_variant(label);
                    return Err(e);
                }
                tracing::trace!(label, %previous, "opened variant");
                Ok(ScenarioNetwork::Variant {
                    network,
                    label: label.to_string(),
                    previous,
                })
            }
        }
    }
}

/// Scoped scenario state. Derefs to the network the scenario works on.
#[derive(Debug)]
pub enum ScenarioNetwork<'a> {
    Deep {
        network: Network,
        label: String,
    },
    Variant {
        network: &'a mut Network,
        label: String,
        previous: String,
    },
}

impl ScenarioNetwork<'_> {
    pub fn label(&self) -> &str {
        match self {
            ScenarioNetwork::Deep { label, .. } | ScenarioNetwork::Variant { label, .. } => label,
        }
    }
}

impl Deref for ScenarioNetwork<'_> {
    type Target = Network;

    fn deref(&self) -> &Network {
        match self {
            ScenarioNetwork::Deep { network, .. } => network,
            ScenarioNetwork::Variant { network, .. } => &**network,
        }
    }
}

impl DerefMut for ScenarioNetwork<'_> {
    fn deref_mut(&mut self) -> &mut Network {
        match self {
            ScenarioNetwork::Deep { network, .. } => network,
            ScenarioNetwork::Variant { network, .. } => &mut **network,
        }
    }
}

impl Drop for ScenarioNetwork<'_> {
    fn drop(&mut self) {
        if let ScenarioNetwork::Variant {
            network,
            label,
            previous,
        } = self
        {
            if let Err(e) = network.set_working_variant(previous) {
                tracing::warn!(%label, %previous, error = %e, "failed to restore working variant");
                return;
            }
            if let Err(e) = network.remove_variant(label) {
                tracing::warn!(%label, error = %e, "failed to remove scenario variant");
            }
        }
    }
}
