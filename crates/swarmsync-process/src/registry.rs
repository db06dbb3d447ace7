use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::component::{ProcessComponent, ProcessListener};
use crate::state::{ComponentId, ProcessState, RollbackReason};

type Roots = DashMap<ComponentId, Arc<dyn ProcessComponent>>;

/// Running process roots of one session.
///
/// A tracked root is dropped from the registry as soon as it reaches a
/// terminal state. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    roots: Arc<Roots>,
}

struct Evict {
    roots: Weak<Roots>,
    id:    ComponentId,
}

impl Evict {
    fn evict(&self) {
        if let Some(roots) = self.roots.upgrade() {
            roots.remove(&self.id);
        }
    }
}

impl ProcessListener for Evict {
    fn on_succeeded(&self) { self.evict() }

    fn on_failed(&self, _reason: &RollbackReason) { self.evict() }
}

impl ProcessRegistry {
    pub fn new() -> Self { Self::default() }

    /// Tracks `root` until it finishes. Terminal components are not tracked.
    pub fn track(&self, root: Arc<dyn ProcessComponent>) {
        if root.state().is_terminal() {
            return;
        }
        let id = root.id();
        root.attach_listener(Arc::new(Evict {
            roots: Arc::downgrade(&self.roots),
            id,
        }));
        self.roots.insert(id, root);
    }

    pub fn get(&self, id: ComponentId) -> Option<Arc<dyn ProcessComponent>> {
        self.roots.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize { self.roots.len() }

    pub fn is_empty(&self) -> bool { self.roots.is_empty() }

    pub fn ids(&self) -> Vec<ComponentId> { self.roots.iter().map(|entry| *entry.key()).collect() }

    fn snapshot(&self) -> Vec<Arc<dyn ProcessComponent>> {
        self.roots.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Pauses every running root. Returns how many were paused.
    pub fn pause_all(&self) -> usize {
        let mut paused = 0;
        for root in self.snapshot() {
            if matches!(root.state(), ProcessState::Running | ProcessState::Rollbacking) {
                match root.pause() {
                    Ok(()) => paused += 1,
                    Err(err) => tracing::debug!(id = %root.id(), error = %err, "not paused"),
                }
            }
        }
        paused
    }

    /// Resumes every paused root. Returns how many were resumed.
    pub fn resume_all(&self) -> usize {
        let mut resumed = 0;
        for root in self.snapshot() {
            if root.state() == ProcessState::Paused {
                match root.resume() {
                    Ok(()) => resumed += 1,
                    Err(err) => tracing::debug!(id = %root.id(), error = %err, "not resumed"),
                }
            }
        }
        resumed
    }
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry").field("roots", &self.roots.len()).finish()
    }
}
