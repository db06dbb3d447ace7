use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Lifecycle state of a process component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Ready,
    Running,
    Paused,
    Rollbacking,
    Succeeded,
    Failed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool { matches!(self, Self::Succeeded | Self::Failed) }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Rollbacking => "ROLLBACKING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Protocol operation, used to report contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Pause,
    Resume,
    Cancel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Opaque identity of a component, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(Uuid);

impl ComponentId {
    pub(crate) fn new() -> Self { Self(Uuid::new_v4()) }

    pub fn as_uuid(&self) -> &Uuid { &self.0 }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Why a process tree is being rolled back.
///
/// Created once by the component that failed and handed unchanged to every
/// listener up the tree.
#[derive(Clone)]
pub struct RollbackReason {
    component: ComponentId,
    name:      Arc<str>,
    hint:      String,
    source:    Option<Arc<dyn StdError + Send + Sync>>,
}

impl RollbackReason {
    pub fn new(component: ComponentId, name: impl Into<Arc<str>>, hint: impl Into<String>) -> Self {
        Self {
            component,
            name: name.into(),
            hint: hint.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn StdError + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Component that raised the rollback.
    pub fn component(&self) -> ComponentId { self.component }

    /// Type name of the component that raised the rollback.
    pub fn component_name(&self) -> &str { &self.name }

    pub fn hint(&self) -> &str { &self.hint }

    pub fn upstream(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl fmt::Debug for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackReason")
            .field("component", &self.component)
            .field("name", &self.name)
            .field("hint", &self.hint)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

/// Shows only the component type and hint. The upstream error may carry
/// storage keys and chunk ids; it stays behind [`StdError::source`] and `Debug`.
impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} failed: {}", self.name, self.hint) }
}

impl StdError for RollbackReason {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
    }
}
