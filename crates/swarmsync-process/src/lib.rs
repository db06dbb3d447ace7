//! Rollback-capable process trees.
//!
//! A user action is a tree of [`ProcessComponent`]s: [`Step`] leaves doing one
//! unit of work each, [`SequentialProcess`] composites ordering them, and
//! [`AsyncComponent`] decorators moving a subtree onto the shared
//! [`ProcessExecutor`]. When any node fails, the failure bubbles to the
//! highest ancestor not yet rolling back, which compensates completed work in
//! reverse order. The root reports exactly one outcome to its listeners.

mod component;
mod composite;
mod decorator;
mod error;
mod executor;
mod registry;
mod result;
mod state;
mod step;
mod sync;

pub use component::{ComponentCore, ProcessComponent, ProcessListener};
pub use composite::{Process, SequentialProcess};
pub use decorator::{AsyncComponent, ProcessDecorator};
pub use error::{ProcessError, ProcessExecutionError, Result};
pub use executor::{ExecutorOptions, ProcessExecutor};
pub use registry::ProcessRegistry;
pub use result::{ResultListener, ResultProcessComponent, ResultProcessStep, ResultStep};
pub use state::{ComponentId, Operation, ProcessState, RollbackReason};
pub use step::{ProcessStep, Step, StepContext};
