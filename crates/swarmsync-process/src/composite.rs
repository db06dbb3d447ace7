//! Composite components owning an ordered list of children.

use std::sync::{Arc, Mutex, Weak};

use crate::component::{ComponentCore, ProcessComponent};
use crate::error::{ProcessError, ProcessExecutionError, Result};
use crate::state::{ComponentId, ProcessState, RollbackReason};
use crate::sync::lock;

/// A component that owns children.
///
/// Structural changes are allowed while the process runs, including from
/// inside one of its own children.
pub trait Process: ProcessComponent {
    fn add(&self, child: Arc<dyn ProcessComponent>) -> Result<()>;

    fn insert(&self, index: usize, child: Arc<dyn ProcessComponent>) -> Result<()>;

    fn remove(&self, id: ComponentId) -> Result<Arc<dyn ProcessComponent>>;

    fn children(&self) -> Vec<Arc<dyn ProcessComponent>>;

    fn position(&self, id: ComponentId) -> Option<usize>;

    fn len(&self) -> usize { self.children().len() }

    fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Runs its children one at a time in insertion order.
///
/// On rollback only the children that were started are compensated, last
/// started first.
pub struct SequentialProcess {
    core:     ComponentCore,
    me:       Weak<SequentialProcess>,
    // Lock order: `cursor` before `children`.
    cursor:   Mutex<usize>,
    children: Mutex<Vec<Arc<dyn ProcessComponent>>>,
}

impl SequentialProcess {
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        let core = ComponentCore::new(name);
        Arc::new_cyclic(|me| Self {
            core,
            me: me.clone(),
            cursor: Mutex::new(0),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Builds a process from `children`, in order.
    pub fn with_children(
        name: impl Into<Arc<str>>,
        children: impl IntoIterator<Item = Arc<dyn ProcessComponent>>,
    ) -> Result<Arc<Self>> {
        let process = Self::new(name);
        for child in children {
            process.add(child)?;
        }
        Ok(process)
    }

    fn weak_self(&self) -> Weak<dyn ProcessComponent> { self.me.clone() }

    fn adopt(&self, child: &Arc<dyn ProcessComponent>) -> Result<()> {
        if child.id() == self.id() {
            return Err(ProcessError::AlreadyParented(child.id()));
        }
        child.core().set_parent(self.weak_self())
    }

    /// Takes the next child to run, or `None` when the walk is over.
    fn next_child(&self) -> Option<Arc<dyn ProcessComponent>> {
        loop {
            self.core.wait_while_paused();
            let mut cursor = lock(&self.cursor);
            match self.core.state() {
                ProcessState::Paused => continue,
                ProcessState::Running => {}
                _ => return None,
            }
            let children = lock(&self.children);
            let child = children.get(*cursor).cloned()?;
            *cursor += 1;
            return Some(child);
        }
    }

    fn current_child(&self) -> Option<Arc<dyn ProcessComponent>> {
        let cursor = lock(&self.cursor);
        let index = cursor.checked_sub(1)?;
        lock(&self.children).get(index).cloned()
    }

    fn started_children(&self) -> Vec<Arc<dyn ProcessComponent>> {
        let cursor = lock(&self.cursor);
        let children = lock(&self.children);
        children.iter().take(*cursor).cloned().collect()
    }
}

impl ProcessComponent for SequentialProcess {
    fn core(&self) -> &ComponentCore { &self.core }

    fn do_execute(&self) -> std::result::Result<(), ProcessExecutionError> {
        while let Some(child) = self.next_child() {
            tracing::debug!(process = %self.core.name(), child = %child.name(), "starting child");
            child.start()?;
            // A child paused mid-flight must finish before its successor starts.
            child.core().wait_while_paused();
        }

        // Asynchronous children may still be running; the process settles
        // only once every started child has.
        for child in self.started_children() {
            if child.state() != ProcessState::Ready {
                child.await_completion(None)?;
            }
        }
        Ok(())
    }

    fn do_rollback(&self, reason: &RollbackReason) {
        let started = self.started_children();
        for child in started.iter().rev() {
            self.core.wait_while_paused();
            if child.state() == ProcessState::Ready {
                continue;
            }
            if let Err(err) = child.cancel(reason.clone()) {
                tracing::warn!(process = %self.core.name(), child = %child.name(), error = %err, "child rollback failed");
            }
        }
    }

    fn do_pause(&self) {
        if let Some(child) = self.current_child()
            && matches!(child.state(), ProcessState::Running | ProcessState::Rollbacking)
            && let Err(err) = child.pause()
        {
            tracing::debug!(process = %self.core.name(), child = %child.name(), error = %err, "child not paused");
        }
    }

    fn do_resume(&self) {
        for child in self.started_children() {
            if child.state() == ProcessState::Paused
                && let Err(err) = child.resume()
            {
                tracing::debug!(process = %self.core.name(), child = %child.name(), error = %err, "child not resumed");
            }
        }
    }

    fn progress(&self) -> f64 {
        let children = self.children();
        if children.is_empty() {
            return self.core.progress();
        }
        children.iter().map(|c| c.progress()).sum::<f64>() / children.len() as f64
    }

    fn as_process(&self) -> Option<&dyn Process> { Some(self) }
}

impl Process for SequentialProcess {
    fn add(&self, child: Arc<dyn ProcessComponent>) -> Result<()> {
        self.adopt(&child)?;
        lock(&self.children).push(child);
        Ok(())
    }

    fn insert(&self, index: usize, child: Arc<dyn ProcessComponent>) -> Result<()> {
        let mut cursor = lock(&self.cursor);
        let mut children = lock(&self.children);
        if index > children.len() {
            return Err(ProcessError::IndexOutOfBounds {
                index,
                len: children.len(),
            });
        }
        self.adopt(&child)?;
        children.insert(index, child);
        if index < *cursor {
            *cursor += 1;
        }
        Ok(())
    }

    fn remove(&self, id: ComponentId) -> Result<Arc<dyn ProcessComponent>> {
        let mut cursor = lock(&self.cursor);
        let mut children = lock(&self.children);
        let index = children
            .iter()
            .position(|c| c.id() == id)
            .ok_or(ProcessError::NotAChild(id))?;
        let child = children.remove(index);
        if index < *cursor {
            *cursor -= 1;
        }
        child.core().clear_parent();
        Ok(child)
    }

    fn children(&self) -> Vec<Arc<dyn ProcessComponent>> { lock(&self.children).clone() }

    fn position(&self, id: ComponentId) -> Option<usize> { lock(&self.children).iter().position(|c| c.id() == id) }

    fn len(&self) -> usize { lock(&self.children).len() }
}

impl std::fmt::Debug for SequentialProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialProcess")
            .field("core", &self.core)
            .field("children", &self.len())
            .finish()
    }
}
