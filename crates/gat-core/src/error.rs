//! Unified error types for the GAT ecosystem
//!
//! [`GatError`] is shared by the network model, the remedial-action simulator
//! and the batch orchestrator. Terminal states of a simulated scenario
//! (divergence, no rule matched, ...) are *not* errors; only validation
//! failures, action application failures, cancellation and I/O are.
//!
//! # Example
//!
//! ```ignore
//! use gat_core::{GatError, GatResult};
//!
//! fn open_breaker(network: &mut Network, id: &str) -> GatResult<()> {
//!     let switch = network.switch_id(id)?;
//!     network.set_switch_open(switch, true);
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// A failed partition of a batch run, kept as plain text so the error stays `Send`
/// and can be written to the batch manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub task_id: String,
    pub message: String,
}

impl std::fmt::Display for PartitionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.task_id, self.message)
    }
}

/// Unified error type for all GAT operations.
#[derive(Error, Debug)]
pub enum GatError {
    /// I/O errors (file access, artifact merging, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors (malformed partition spec, duplicate ids, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced network element, action, rule or contingency does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Load flow raised an error (as opposed to diverging, which is a normal outcome)
    #[error("Solver error: {0}")]
    Solver(String),

    /// A remedial action could not be applied to the scenario network.
    #[error("Failed to apply action '{action}': {source}")]
    ActionApplication {
        action: String,
        #[source]
        source: Box<GatError>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// The run was cancelled through its cancellation token.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// One or more batch partitions failed.
    #[error("{} batch task(s) failed: {}", .0.len(), join_failures(.0))]
    Batch(Vec<PartitionFailure>),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

fn join_failures(failures: &[PartitionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl GatError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GatError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors the caller should have caught before any round ran.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GatError::Validation(_) | GatError::NotFound { .. } | GatError::Parse(_)
        )
    }
}

/// Convenience type alias for Results using GatError.
pub type GatResult<T> = Result<T, GatError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for GatError {
    fn from(err: anyhow::Error) -> Self {
        GatError::Other(format!("{err:#}"))
    }
}

impl From<String> for GatError {
    fn from(s: String) -> Self {
        GatError::Other(s)
    }
}

impl From<&str> for GatError {
    fn from(s: &str) -> Self {
        GatError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for GatError {
    fn from(err: serde_json::Error) -> Self {
        GatError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatError::Solver("jacobian is singular".into());
        assert!(err.to_string().contains("Solver error"));
        assert!(err.to_string().contains("jacobian is singular"));
    }

    #[test]
    fn test_not_found_display() {
        let err = GatError::not_found("Branch", "UNKNOWN");
        assert_eq!(err.to_string(), "Branch 'UNKNOWN' not found");
        assert!(err.is_validation());
    }

    #[test]
    fn test_action_application_wraps_source() {
        let err = GatError::ActionApplication {
            action: "open_line".into(),
            source: Box::new(GatError::not_found("Switch", "BR1")),
        };
        assert_eq!(
            err.to_string(),
            "Failed to apply action 'open_line': Switch 'BR1' not found"
        );
        assert!(!err.is_validation());
    }

    #[test]
    fn test_batch_error_lists_failures() {
        let err = GatError::Batch(vec![
            PartitionFailure {
                task_id: "task-1-of-2".into(),
                message: "boom".into(),
            },
            PartitionFailure {
                task_id: "task-2-of-2".into(),
                message: "bang".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 batch task(s) failed"));
        assert!(text.contains("task-1-of-2: boom; task-2-of-2: bang"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let gat_err: GatError = io_err.into();
        assert!(matches!(gat_err, GatError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GatResult<()> {
            Err(GatError::Validation("test".into()))
        }

        fn outer() -> GatResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
