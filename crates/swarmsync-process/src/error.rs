use std::error::Error as StdError;
use std::sync::Arc;

use crate::state::{ComponentId, Operation, ProcessState, RollbackReason};

/// Errors surfaced by the process protocol itself.
///
/// `InvalidState` is a contract violation in the orchestration code and is
/// always handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cannot {operation} a component in state {state}")]
    InvalidState {
        operation: Operation,
        state:     ProcessState,
    },

    #[error("component {0} already belongs to a process")]
    AlreadyParented(ComponentId),

    #[error("component {0} is not a child of this process")]
    NotAChild(ComponentId),

    #[error("index {index} is out of bounds for a process with {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("component {0} has no parent process")]
    NoParent(ComponentId),

    #[error("timed out waiting for component {0}")]
    Timeout(ComponentId),

    #[error("worker pool unavailable: {0}")]
    Pool(String),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Failure of a unit of work, returned from `do_execute`.
///
/// The framework stamps it with the failing component's identity and turns it
/// into a [`RollbackReason`] before running the cancellation protocol.
#[derive(Debug, thiserror::Error)]
#[error("{hint}")]
pub struct ProcessExecutionError {
    hint:   String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProcessExecutionError {
    pub fn new(hint: impl Into<String>) -> Self {
        Self {
            hint:   hint.into(),
            source: None,
        }
    }

    pub fn with_source(hint: impl Into<String>, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            hint:   hint.into(),
            source: Some(source.into()),
        }
    }

    pub fn hint(&self) -> &str { &self.hint }

    pub(crate) fn into_reason(self, component: ComponentId, name: &str) -> RollbackReason {
        let reason = RollbackReason::new(component, name, self.hint);
        match self.source {
            Some(source) => reason.with_source(Arc::from(source)),
            None => reason,
        }
    }
}

impl From<ProcessError> for ProcessExecutionError {
    fn from(e: ProcessError) -> Self { Self::with_source("process protocol error", e) }
}
