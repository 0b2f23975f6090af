use std::time::Duration;
use thiserror::Error;

/// Result type for partitioning operations.
pub type Result<T> = std::result::Result<T, PartitionError>;

/// Errors that abort a partition call.
///
/// Heuristic shortfalls (terminal sets that stay under target, zero flows,
/// vertices heavier than the budget) are not errors. They are logged and
/// counted in [`crate::PartitionReport`].
#[derive(Error, Debug)]
pub enum PartitionError {
    /// The graph has no vertices.
    #[error("graph is empty")]
    EmptyGraph,

    /// A caller supplied parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An internal consistency check failed.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The configured deadline passed before the work-list was drained.
    #[error("deadline exceeded after {elapsed:?} with {pending} pieces pending")]
    DeadlineExceeded { elapsed: Duration, pending: usize },
}

impl PartitionError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        PartitionError::InvariantViolation(msg.into())
    }
}
