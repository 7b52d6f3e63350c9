//! Load-flow seam.
//!
//! The simulator never computes electrical quantities itself. It calls a
//! [`LoadFlow`] implementation resolved once at startup from a
//! [`LoadFlowRegistry`].

mod loadflow;
mod registry;

pub use loadflow::{LoadFlow, LoadFlowParameters, LoadFlowResult, LoadFlowStatus};
pub use registry::LoadFlowRegistry;
