//! Components that hand a computed value to their observers.

use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::component::{ComponentCore, ProcessComponent, ProcessListener, short_type_name};
use crate::error::ProcessExecutionError;
use crate::state::RollbackReason;
use crate::step::StepContext;
use crate::sync::{lock, read, write};

pub trait ResultListener<T>: Send + Sync {
    fn on_result(&self, result: &T);
}

/// A component that produces a value once its work is done.
pub trait ResultProcessComponent<T>: ProcessComponent {
    /// The computed value, once available.
    fn result(&self) -> Option<T>;

    fn attach_result_listener(&self, listener: Arc<dyn ResultListener<T>>);

    fn detach_result_listener(&self, listener: &Arc<dyn ResultListener<T>>) -> bool;
}

/// A [`ProcessStep`](crate::ProcessStep) that computes a value.
pub trait ResultProcessStep: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn name(&self) -> &str { short_type_name::<Self>() }

    fn execute(&self, ctx: &StepContext<'_>) -> std::result::Result<Self::Output, ProcessExecutionError>;

    fn rollback(
        &self,
        ctx: &StepContext<'_>,
        reason: &RollbackReason,
    ) -> std::result::Result<(), ProcessExecutionError> {
        let _ = (ctx, reason);
        Ok(())
    }
}

/// Runs a [`ResultProcessStep`] and publishes its output once the component
/// has SUCCEEDED. Output computed by a run that ends up rolled back is never
/// published.
pub struct ResultStep<S: ResultProcessStep> {
    core:      ComponentCore,
    step:      S,
    pending:   Mutex<Option<S::Output>>,
    result:    Mutex<Option<S::Output>>,
    listeners: RwLock<Vec<Arc<dyn ResultListener<S::Output>>>>,
}

impl<S: ResultProcessStep> ResultStep<S> {
    pub fn new(step: S) -> Arc<Self> {
        let core = ComponentCore::new(step.name());
        Arc::new_cyclic(|me: &Weak<Self>| {
            core.attach_listener(Arc::new(Publisher { owner: me.clone() }));
            Self {
                core,
                step,
                pending: Mutex::new(None),
                result: Mutex::new(None),
                listeners: RwLock::new(Vec::new()),
            }
        })
    }

    pub fn inner(&self) -> &S { &self.step }

    fn publish(&self) {
        let Some(output) = lock(&self.pending).take() else {
            return;
        };
        *lock(&self.result) = Some(output.clone());
        let listeners = read(&self.listeners).clone();
        for listener in listeners {
            listener.on_result(&output);
        }
    }
}

/// Moves the pending output into place when the step succeeds.
struct Publisher<S: ResultProcessStep> {
    owner: Weak<ResultStep<S>>,
}

impl<S: ResultProcessStep> ProcessListener for Publisher<S> {
    fn on_succeeded(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.publish();
        }
    }

    fn on_failed(&self, _reason: &RollbackReason) {}
}

impl<S: ResultProcessStep> ProcessComponent for ResultStep<S> {
    fn core(&self) -> &ComponentCore { &self.core }

    fn do_execute(&self) -> std::result::Result<(), ProcessExecutionError> {
        let output = self.step.execute(&StepContext::new(self))?;
        *lock(&self.pending) = Some(output);
        Ok(())
    }

    fn do_rollback(&self, reason: &RollbackReason) {
        lock(&self.pending).take();
        if let Err(err) = self.step.rollback(&StepContext::new(self), reason) {
            tracing::warn!(component = %self.core.name(), id = %self.core.id(), error = %err, "rollback failed");
        }
    }
}

impl<S: ResultProcessStep> ResultProcessComponent<S::Output> for ResultStep<S> {
    fn result(&self) -> Option<S::Output> { lock(&self.result).clone() }

    fn attach_result_listener(&self, listener: Arc<dyn ResultListener<S::Output>>) {
        write(&self.listeners).push(listener);
    }

    fn detach_result_listener(&self, listener: &Arc<dyn ResultListener<S::Output>>) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }
}
