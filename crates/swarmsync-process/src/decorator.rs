//! Decorators add behaviour around a component without changing its type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;

use crate::component::{ComponentCore, ProcessComponent, ProcessListener, run_started};
use crate::error::ProcessExecutionError;
use crate::executor::ProcessExecutor;
use crate::state::{ProcessState, RollbackReason};
use crate::sync::lock;

/// A component wrapping another one.
pub trait ProcessDecorator: ProcessComponent {
    fn decorated(&self) -> &Arc<dyn ProcessComponent>;
}

/// Runs the wrapped component on the shared [`ProcessExecutor`].
///
/// `start` returns as soon as the work is queued. The decorator itself only
/// becomes SUCCEEDED or FAILED once the wrapped component reports back, so
/// parents that need the outcome must `await_completion` it.
///
/// Started from one of the executor's own workers, the wrapped component
/// runs inline instead, so nested trees never wait on their own queue.
pub struct AsyncComponent {
    core:      ComponentCore,
    me:        Weak<AsyncComponent>,
    inner:     Arc<dyn ProcessComponent>,
    executor:  ProcessExecutor,
    token:     CancellationToken,
    // Set once the wrapped component left READY; guards against rollback.
    launched:  Mutex<bool>,
    succeeded: AtomicBool,
    failed:    AtomicBool,
}

impl AsyncComponent {
    pub fn new(inner: Arc<dyn ProcessComponent>, executor: ProcessExecutor) -> Arc<Self> {
        let core = ComponentCore::new(format!("Async({})", inner.name()));
        Arc::new_cyclic(|me| Self {
            core,
            me: me.clone(),
            inner,
            executor,
            token: CancellationToken::new(),
            launched: Mutex::new(false),
            succeeded: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        })
    }

    /// Starts the wrapped component unless the decorator was cancelled first.
    ///
    /// The check and the READY to RUNNING move happen under `launched`, the
    /// lock rollback takes before it looks at the wrapped component.
    fn launch(&self) {
        {
            let mut launched = lock(&self.launched);
            if self.token.is_cancelled() {
                tracing::debug!(component = %self.core.name(), "cancelled before start");
                return;
            }
            if let Err(err) = self.inner.core().begin() {
                tracing::warn!(component = %self.core.name(), error = %err, "async start failed");
                return;
            }
            *launched = true;
        }
        if let Err(err) = run_started(self.inner.as_ref()) {
            tracing::warn!(component = %self.core.name(), error = %err, "async run failed");
        }
    }

    fn on_inner_succeeded(&self) {
        self.succeeded.store(true, Ordering::SeqCst);
        self.core.succeed();
    }

    fn on_inner_failed(&self, reason: &RollbackReason) {
        self.failed.store(true, Ordering::SeqCst);
        // Nobody above the wrapped component will notice the failure, so
        // the decorator raises it into its own tree.
        if self.inner.parent().is_none()
            && !self.core.rollback_started()
            && let Err(err) = self.cancel(reason.clone())
        {
            tracing::warn!(component = %self.core.name(), id = %self.core.id(), error = %err, "could not cancel after async failure");
        }
    }
}

struct InnerListener {
    owner: Weak<AsyncComponent>,
}

impl ProcessListener for InnerListener {
    fn on_succeeded(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.on_inner_succeeded();
        }
    }

    fn on_failed(&self, reason: &RollbackReason) {
        if let Some(owner) = self.owner.upgrade() {
            owner.on_inner_failed(reason);
        }
    }
}

impl ProcessDecorator for AsyncComponent {
    fn decorated(&self) -> &Arc<dyn ProcessComponent> { &self.inner }
}

impl ProcessComponent for AsyncComponent {
    fn core(&self) -> &ComponentCore { &self.core }

    fn do_execute(&self) -> std::result::Result<(), ProcessExecutionError> {
        self.inner.attach_listener(Arc::new(InnerListener { owner: self.me.clone() }));

        if self.executor.on_worker_thread() {
            tracing::debug!(component = %self.core.name(), "running inline on pool worker");
            self.launch();
            return Ok(());
        }

        let me = self
            .me
            .upgrade()
            .ok_or_else(|| ProcessExecutionError::new("component dropped before it was queued"))?;
        self.executor.spawn(move || me.launch())?;
        Ok(())
    }

    fn do_rollback(&self, reason: &RollbackReason) {
        let launched = {
            let launched = lock(&self.launched);
            self.token.cancel();
            *launched
        };
        if !launched {
            self.failed.store(true, Ordering::SeqCst);
            return;
        }
        match self.inner.state() {
            ProcessState::Rollbacking | ProcessState::Failed => {}
            _ => {
                if let Err(err) = self.inner.cancel(reason.clone()) {
                    tracing::debug!(component = %self.core.name(), error = %err, "wrapped component already terminal");
                }
            }
        }
        // The worker may still be finishing the wrapped rollback; wait for it
        // so the decorator fails after its content.
        if !self.failed.load(Ordering::SeqCst) {
            self.inner.core().wait_settled(None);
            self.failed.store(true, Ordering::SeqCst);
        }
    }

    fn do_pause(&self) {
        if let Err(err) = self.inner.pause() {
            tracing::debug!(component = %self.core.name(), error = %err, "wrapped component not paused");
        }
    }

    fn do_resume(&self) {
        if let Err(err) = self.inner.resume() {
            tracing::debug!(component = %self.core.name(), error = %err, "wrapped component not resumed");
        }
    }

    fn may_succeed(&self) -> bool { self.succeeded.load(Ordering::SeqCst) }

    fn may_fail(&self) -> bool { self.failed.load(Ordering::SeqCst) }

    fn progress(&self) -> f64 { self.inner.progress() }
}
