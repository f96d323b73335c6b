//! Error types for ostinato-rt.

use crate::task::{SchedPolicy, TaskState};
use thiserror::Error;

/// Error type for task-manager and synchronization operations.
///
/// Capacity exhaustion is reported distinctly from caller misuse so that
/// integrators can retry the former and fix the latter.
#[derive(Error, Debug)]
pub enum Error {
    #[error("task pool exhausted ({capacity} slots in use)")]
    Exhausted { capacity: usize },

    #[error("stale or invalid task handle")]
    StaleHandle,

    #[error("operation requires task state {expected:?}, found {found:?}")]
    InvalidState {
        expected: TaskState,
        found: TaskState,
    },

    #[error("task has no timing contract; call configure first")]
    NotConfigured,

    #[error("priority {priority} is not valid under {policy:?} scheduling")]
    InvalidPriority { priority: u8, policy: SchedPolicy },

    #[error("scheduling policy cannot change after the first task has started")]
    PolicyLocked,

    #[error("task is already being joined by another thread")]
    JoinContended,

    #[error("task body panicked")]
    TaskPanicked,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
