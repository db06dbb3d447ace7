//! Leaf components: a single unit of work plus its compensation.

use std::sync::Arc;

use crate::component::{ComponentCore, ProcessComponent, short_type_name};
use crate::error::{ProcessError, ProcessExecutionError, Result};
use crate::state::{ComponentId, RollbackReason};

/// A unit of work that can be undone.
///
/// Wrap it in a [`Step`] to place it in a process tree.
pub trait ProcessStep: Send + Sync + 'static {
    fn name(&self) -> &str { short_type_name::<Self>() }

    fn execute(&self, ctx: &StepContext<'_>) -> std::result::Result<(), ProcessExecutionError>;

    /// Undoes `execute`. The default does nothing.
    ///
    /// Errors are logged and swallowed; the rest of the tree still rolls back.
    fn rollback(
        &self,
        ctx: &StepContext<'_>,
        reason: &RollbackReason,
    ) -> std::result::Result<(), ProcessExecutionError> {
        let _ = (ctx, reason);
        Ok(())
    }
}

/// What a running step may see of its own component.
pub struct StepContext<'a> {
    component: &'a dyn ProcessComponent,
}

impl<'a> StepContext<'a> {
    pub fn new(component: &'a dyn ProcessComponent) -> Self { Self { component } }

    pub fn id(&self) -> ComponentId { self.component.id() }

    pub fn name(&self) -> &str { self.component.name() }

    pub fn set_progress(&self, progress: f64) { self.component.core().set_progress(progress) }

    /// Parks while the component is paused. Long steps call this between
    /// units of work.
    pub fn checkpoint(&self) { self.component.core().wait_while_paused() }

    pub fn parent(&self) -> Option<Arc<dyn ProcessComponent>> { self.component.parent() }

    /// Appends `child` to the end of the owning process.
    pub fn append_to_parent(&self, child: Arc<dyn ProcessComponent>) -> Result<()> {
        let parent = self.parent().ok_or(ProcessError::NoParent(self.id()))?;
        let process = parent.as_process().ok_or(ProcessError::NoParent(self.id()))?;
        process.add(child)
    }

    /// Inserts `child` right after this step, so it runs next.
    pub fn insert_after_self(&self, child: Arc<dyn ProcessComponent>) -> Result<()> {
        let parent = self.parent().ok_or(ProcessError::NoParent(self.id()))?;
        let process = parent.as_process().ok_or(ProcessError::NoParent(self.id()))?;
        let index = process.position(self.id()).ok_or(ProcessError::NotAChild(self.id()))?;
        process.insert(index + 1, child)
    }
}

/// Component wrapper running a [`ProcessStep`] inline on the calling thread.
pub struct Step<S> {
    core: ComponentCore,
    step: S,
}

impl<S: ProcessStep> Step<S> {
    pub fn new(step: S) -> Arc<Self> {
        let core = ComponentCore::new(step.name());
        Arc::new(Self { core, step })
    }

    pub fn inner(&self) -> &S { &self.step }
}

impl<S: ProcessStep> ProcessComponent for Step<S> {
    fn core(&self) -> &ComponentCore { &self.core }

    fn do_execute(&self) -> std::result::Result<(), ProcessExecutionError> {
        self.step.execute(&StepContext::new(self))
    }

    fn do_rollback(&self, reason: &RollbackReason) {
        if let Err(err) = self.step.rollback(&StepContext::new(self), reason) {
            tracing::warn!(component = %self.core.name(), id = %self.core.id(), error = %err, "rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProcessState;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flaky {
        fail:        bool,
        rolled_back: AtomicBool,
    }

    impl ProcessStep for Flaky {
        fn execute(&self, ctx: &StepContext<'_>) -> std::result::Result<(), ProcessExecutionError> {
            ctx.set_progress(0.5);
            if self.fail { Err(ProcessExecutionError::new("flaky")) } else { Ok(()) }
        }

        fn rollback(
            &self,
            _ctx: &StepContext<'_>,
            _reason: &RollbackReason,
        ) -> std::result::Result<(), ProcessExecutionError> {
            self.rolled_back.store(true, Ordering::SeqCst);
            Err(ProcessExecutionError::new("rollback also broke"))
        }
    }

    #[test]
    fn step_takes_its_type_name() {
        let step = Step::new(Flaky {
            fail:        false,
            rolled_back: AtomicBool::new(false),
        });
        assert_eq!(step.name(), "Flaky");
    }

    #[test]
    fn failing_rollback_is_swallowed() {
        let step = Step::new(Flaky {
            fail:        true,
            rolled_back: AtomicBool::new(false),
        });
        step.start().unwrap();
        assert_eq!(step.state(), ProcessState::Failed);
        assert!(step.inner().rolled_back.load(Ordering::SeqCst));
    }

    #[test]
    fn orphan_step_cannot_append() {
        struct Appender;
        impl ProcessStep for Appender {
            fn execute(&self, ctx: &StepContext<'_>) -> std::result::Result<(), ProcessExecutionError> {
                ctx.append_to_parent(Step::new(Appender))?;
                Ok(())
            }
        }

        let step = Step::new(Appender);
        step.start().unwrap();
        assert_eq!(step.state(), ProcessState::Failed);
    }
}
