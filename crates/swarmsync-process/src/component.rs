//! The state machine shared by every node of a process tree.
//!
//! Each node owns a [`ComponentCore`] (identity, state, progress, parent link
//! and listeners) and implements the `do_*` hooks of [`ProcessComponent`]. The
//! protocol methods (`start`, `pause`, `resume`, `cancel`, `await_completion`)
//! are provided by the trait and enforce the legal transitions:
//!
//! | operation | from                          | to                      |
//! |-----------|-------------------------------|-------------------------|
//! | start     | READY                         | RUNNING                 |
//! | pause     | RUNNING, ROLLBACKING          | PAUSED                  |
//! | resume    | PAUSED                        | RUNNING or ROLLBACKING  |
//! | cancel    | RUNNING, PAUSED, SUCCEEDED    | ROLLBACKING, then FAILED |
//!
//! A failure anywhere bubbles to the highest ancestor that is not yet rolling
//! back, which then compensates its children in reverse execution order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::time::Duration;

use crate::composite::Process;
use crate::error::{ProcessError, ProcessExecutionError, Result};
use crate::state::{ComponentId, Operation, ProcessState, RollbackReason};
use crate::sync::{lock, read, wait_timeout_while, wait_while, write};

/// Observer of a component's terminal outcome.
///
/// Called on whichever thread finalises the component; exactly one of the
/// two methods is called, once.
pub trait ProcessListener: Send + Sync {
    fn on_succeeded(&self);

    fn on_failed(&self, reason: &RollbackReason);
}

struct Phase {
    state:           ProcessState,
    paused_from:     Option<ProcessState>,
    pending_success: bool,
    pending_failure: Option<RollbackReason>,
    settled:         bool,
}

/// Identity, state and bookkeeping common to all components.
pub struct ComponentCore {
    id:               ComponentId,
    name:             Arc<str>,
    phase:            Mutex<Phase>,
    changed:          Condvar,
    progress:         Mutex<f64>,
    parent:           RwLock<Option<Weak<dyn ProcessComponent>>>,
    listeners:        RwLock<Vec<Arc<dyn ProcessListener>>>,
    rollback_started: AtomicBool,
}

impl ComponentCore {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id:               ComponentId::new(),
            name:             name.into(),
            phase:            Mutex::new(Phase {
                state:           ProcessState::Ready,
                paused_from:     None,
                pending_success: false,
                pending_failure: None,
                settled:         false,
            }),
            changed:          Condvar::new(),
            progress:         Mutex::new(0.0),
            parent:           RwLock::new(None),
            listeners:        RwLock::new(Vec::new()),
            rollback_started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ComponentId { self.id }

    pub fn name(&self) -> &str { &self.name }

    pub fn state(&self) -> ProcessState { lock(&self.phase).state }

    pub fn progress(&self) -> f64 { *lock(&self.progress) }

    /// Advisory progress, clamped to `0.0..=1.0`.
    pub fn set_progress(&self, progress: f64) {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        *lock(&self.progress) = progress;
    }

    /// The owning process, if it is still alive.
    pub fn parent(&self) -> Option<Arc<dyn ProcessComponent>> {
        read(&self.parent).as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Weak<dyn ProcessComponent>) -> Result<()> {
        let mut slot = write(&self.parent);
        if slot.as_ref().is_some_and(|p| p.strong_count() > 0) {
            return Err(ProcessError::AlreadyParented(self.id));
        }
        *slot = Some(parent);
        Ok(())
    }

    pub(crate) fn clear_parent(&self) { *write(&self.parent) = None; }

    pub fn attach_listener(&self, listener: Arc<dyn ProcessListener>) {
        write(&self.listeners).push(listener);
    }

    pub fn detach_listener(&self, listener: &Arc<dyn ProcessListener>) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Whether this component has begun (or finished) compensating.
    pub fn rollback_started(&self) -> bool { self.rollback_started.load(Ordering::SeqCst) }

    fn claim_rollback(&self) -> bool { !self.rollback_started.swap(true, Ordering::SeqCst) }

    fn transition(&self, operation: Operation, from: &[ProcessState], to: ProcessState) -> Result<()> {
        let mut phase = lock(&self.phase);
        if !from.contains(&phase.state) {
            return Err(ProcessError::InvalidState {
                operation,
                state: phase.state,
            });
        }
        tracing::debug!(component = %self.name, id = %self.id, from = %phase.state, to = %to, "state change");
        phase.state = to;
        self.changed.notify_all();
        Ok(())
    }

    pub(crate) fn begin(&self) -> Result<()> {
        self.transition(Operation::Start, &[ProcessState::Ready], ProcessState::Running)
    }

    pub(crate) fn enter_rollback(&self) -> Result<()> {
        let mut phase = lock(&self.phase);
        match phase.state {
            ProcessState::Running | ProcessState::Paused | ProcessState::Succeeded => {
                tracing::debug!(component = %self.name, id = %self.id, from = %phase.state, "state change to ROLLBACKING");
                phase.state = ProcessState::Rollbacking;
                phase.paused_from = None;
                phase.pending_success = false;
                self.changed.notify_all();
                Ok(())
            }
            state => Err(ProcessError::InvalidState {
                operation: Operation::Cancel,
                state,
            }),
        }
    }

    pub(crate) fn pause(&self) -> Result<()> {
        let mut phase = lock(&self.phase);
        match phase.state {
            state @ (ProcessState::Running | ProcessState::Rollbacking) => {
                phase.paused_from = Some(state);
                phase.state = ProcessState::Paused;
                tracing::debug!(component = %self.name, id = %self.id, from = %state, "paused");
                self.changed.notify_all();
                Ok(())
            }
            state => Err(ProcessError::InvalidState {
                operation: Operation::Pause,
                state,
            }),
        }
    }

    /// Returns to the paused phase, finishing an outcome that arrived while paused.
    pub(crate) fn resume(&self) -> Result<ProcessState> {
        let mut phase = lock(&self.phase);
        if phase.state != ProcessState::Paused {
            return Err(ProcessError::InvalidState {
                operation: Operation::Resume,
                state:     phase.state,
            });
        }
        let into = phase.paused_from.take().unwrap_or(ProcessState::Running);
        phase.state = into;
        tracing::debug!(component = %self.name, id = %self.id, into = %into, "resumed");

        let mut succeeded = false;
        let mut failed = None;
        if into == ProcessState::Running && std::mem::take(&mut phase.pending_success) {
            phase.state = ProcessState::Succeeded;
            succeeded = true;
        } else if into == ProcessState::Rollbacking
            && let Some(reason) = phase.pending_failure.take()
        {
            phase.state = ProcessState::Failed;
            failed = Some(reason);
        }
        self.changed.notify_all();
        drop(phase);

        if succeeded {
            self.settle_success();
        } else if let Some(reason) = failed {
            self.settle_failure(&reason);
        }
        Ok(into)
    }

    /// Moves RUNNING to SUCCEEDED and notifies listeners.
    ///
    /// A paused component records the success and finishes it on resume.
    /// Returns `true` if this call finalised the component.
    pub fn succeed(&self) -> bool {
        let mut phase = lock(&self.phase);
        match phase.state {
            ProcessState::Running => {
                phase.state = ProcessState::Succeeded;
                self.changed.notify_all();
            }
            ProcessState::Paused if phase.paused_from == Some(ProcessState::Running) => {
                phase.pending_success = true;
                return false;
            }
            _ => return false,
        }
        drop(phase);
        self.settle_success();
        true
    }

    /// Moves ROLLBACKING to FAILED and notifies listeners with `reason`.
    ///
    /// Returns `true` if this call finalised the component.
    pub fn fail(&self, reason: RollbackReason) -> bool {
        let mut phase = lock(&self.phase);
        match phase.state {
            ProcessState::Rollbacking => {
                phase.state = ProcessState::Failed;
                self.changed.notify_all();
            }
            ProcessState::Paused if phase.paused_from == Some(ProcessState::Rollbacking) => {
                phase.pending_failure = Some(reason);
                return false;
            }
            _ => return false,
        }
        drop(phase);
        self.settle_failure(&reason);
        true
    }

    fn settle_success(&self) {
        self.set_progress(1.0);
        tracing::debug!(component = %self.name, id = %self.id, "succeeded");
        for listener in self.listener_snapshot() {
            listener.on_succeeded();
        }
        self.settle();
    }

    fn settle_failure(&self, reason: &RollbackReason) {
        tracing::info!(component = %self.name, id = %self.id, %reason, "failed");
        for listener in self.listener_snapshot() {
            listener.on_failed(reason);
        }
        self.settle();
    }

    fn settle(&self) {
        lock(&self.phase).settled = true;
        self.changed.notify_all();
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn ProcessListener>> { read(&self.listeners).clone() }

    /// Parks the calling thread while the component is PAUSED.
    pub fn wait_while_paused(&self) {
        let guard = lock(&self.phase);
        let _guard = wait_while(&self.changed, guard, |p| p.state == ProcessState::Paused);
    }

    /// Blocks until the component reached a terminal state and its listeners
    /// were notified. Returns `false` if `timeout` elapsed first.
    pub fn wait_settled(&self, timeout: Option<Duration>) -> bool {
        let guard = lock(&self.phase);
        match timeout {
            None => {
                let _guard = wait_while(&self.changed, guard, |p| !p.settled);
                true
            }
            Some(timeout) => {
                let (_guard, timed_out) = wait_timeout_while(&self.changed, guard, timeout, |p| !p.settled);
                !timed_out
            }
        }
    }
}

impl std::fmt::Debug for ComponentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A node in a process tree.
///
/// Implementors provide [`core`](Self::core) and the `do_*` hooks; the
/// protocol methods are provided and should not be overridden.
pub trait ProcessComponent: Send + Sync {
    fn core(&self) -> &ComponentCore;

    /// The unit of work. An `Err` triggers the cancellation protocol.
    fn do_execute(&self) -> std::result::Result<(), ProcessExecutionError>;

    /// Compensates work done by `do_execute`. Best effort: failures are
    /// logged by the implementor and never propagated.
    fn do_rollback(&self, reason: &RollbackReason);

    fn do_pause(&self) {}

    fn do_resume(&self) {}

    /// Whether returning from `do_execute` may finalise the component as
    /// SUCCEEDED. Deferred components answer `false` until their work is done.
    fn may_succeed(&self) -> bool { true }

    /// Whether returning from `do_rollback` may finalise the component as FAILED.
    fn may_fail(&self) -> bool { true }

    fn progress(&self) -> f64 { self.core().progress() }

    fn as_process(&self) -> Option<&dyn Process> { None }

    fn id(&self) -> ComponentId { self.core().id() }

    fn name(&self) -> &str { self.core().name() }

    fn state(&self) -> ProcessState { self.core().state() }

    fn parent(&self) -> Option<Arc<dyn ProcessComponent>> { self.core().parent() }

    fn attach_listener(&self, listener: Arc<dyn ProcessListener>) { self.core().attach_listener(listener) }

    fn detach_listener(&self, listener: &Arc<dyn ProcessListener>) -> bool {
        self.core().detach_listener(listener)
    }

    /// Runs the component. READY is a one-way gate: a second call fails with
    /// [`ProcessError::InvalidState`].
    ///
    /// Execution failures do not surface here; they run the cancellation
    /// protocol and reach listeners as `on_failed`.
    fn start(&self) -> Result<()> {
        self.core().begin()?;
        run_started(self)
    }

    fn pause(&self) -> Result<()> {
        self.core().pause()?;
        self.do_pause();
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.core().resume()?;
        self.do_resume();
        Ok(())
    }

    /// Rolls back the tree this component belongs to.
    ///
    /// The call is delegated to the parent while the parent has not started
    /// rolling back, so compensation always begins at the highest affected
    /// ancestor. Cancelling a component that is already rolling back or
    /// FAILED is a no-op.
    fn cancel(&self, reason: RollbackReason) -> Result<()> {
        let core = self.core();
        if core.rollback_started() {
            return Ok(());
        }

        let state = core.state();
        if !matches!(
            state,
            ProcessState::Running | ProcessState::Paused | ProcessState::Succeeded
        ) {
            return Err(ProcessError::InvalidState {
                operation: Operation::Cancel,
                state,
            });
        }

        if let Some(parent) = core.parent()
            && !parent.core().rollback_started()
        {
            tracing::debug!(component = %core.name(), id = %core.id(), parent = %parent.id(), "delegating rollback to parent");
            return parent.cancel(reason);
        }

        if !core.claim_rollback() {
            return Ok(());
        }
        core.enter_rollback()?;

        tracing::info!(component = %core.name(), id = %core.id(), %reason, "rolling back");
        self.do_rollback(&reason);

        if self.may_fail() {
            core.fail(reason);
        }
        Ok(())
    }

    /// Blocks until the component is SUCCEEDED or FAILED and its listeners
    /// have been told. A timeout only stops the wait, never the work.
    fn await_completion(&self, timeout: Option<Duration>) -> Result<()> {
        if self.core().wait_settled(timeout) {
            Ok(())
        } else {
            Err(ProcessError::Timeout(self.id()))
        }
    }
}

/// Runs the work of a component already moved to RUNNING and finalises it.
pub(crate) fn run_started<C: ProcessComponent + ?Sized>(component: &C) -> Result<()> {
    let core = component.core();
    // Rolled back between leaving READY and getting here: nothing to run.
    if core.rollback_started() {
        return Ok(());
    }
    match component.do_execute() {
        Ok(()) => {
            if component.may_succeed() {
                core.succeed();
            }
            Ok(())
        }
        Err(err) => {
            let reason = err.into_reason(core.id(), core.name());
            tracing::warn!(component = %core.name(), id = %core.id(), %reason, "execution failed");
            component.cancel(reason)
        }
    }
}

/// Short type name used as the default component name.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
