use gat_core::{GatError, GatResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and running
/// simulations. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(GatError::Cancelled)` once cancelled; `point` names where the check
    /// happened.
    pub fn check(&self, point: &str) -> GatResult<()> {
        if self.is_cancelled() {
            tracing::warn!(point, "cancellation requested");
            return Err(GatError::Cancelled(point.to_string()));
        }
        Ok(())
    }
}
