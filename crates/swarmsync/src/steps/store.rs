use std::sync::{Arc, Mutex, PoisonError};

use swarmsync_data::{ContentKey, DataError, DataManager, LocationKey, ProtectionKeys};
use swarmsync_process::{ProcessExecutionError, ProcessStep, ResultProcessStep, RollbackReason, StepContext};

type StepResult<T = ()> = Result<T, ProcessExecutionError>;

fn entry(location: &LocationKey, content: &ContentKey) -> String { format!("{location}/{content}") }

/// Stores one DHT entry. Rollback restores what was there before.
pub struct PutStep {
    data:       Arc<dyn DataManager>,
    location:   LocationKey,
    content:    ContentKey,
    payload:    Vec<u8>,
    protection: ProtectionKeys,
    previous:   Mutex<Option<Option<Vec<u8>>>>,
}

impl PutStep {
    pub fn new(
        data: Arc<dyn DataManager>,
        location: LocationKey,
        content: ContentKey,
        payload: Vec<u8>,
        protection: ProtectionKeys,
    ) -> Self {
        Self {
            data,
            location,
            content,
            payload,
            protection,
            previous: Mutex::new(None),
        }
    }

    pub fn location(&self) -> &LocationKey { &self.location }
}

impl ProcessStep for PutStep {
    fn execute(&self, _ctx: &StepContext<'_>) -> StepResult {
        let previous = self.data.get(&self.location, &self.content).map_err(|e| {
            ProcessExecutionError::with_source(format!("could not read {}", entry(&self.location, &self.content)), e)
        })?;
        self.data
            .put(&self.location, &self.content, &self.payload, &self.protection)
            .map_err(|e| {
                ProcessExecutionError::with_source(format!("could not put {}", entry(&self.location, &self.content)), e)
            })?;
        *self.previous.lock().unwrap_or_else(PoisonError::into_inner) = Some(previous);
        Ok(())
    }

    fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> StepResult {
        let previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner).take();
        let restored = match previous {
            None => return Ok(()),
            Some(None) => self.data.remove(&self.location, &self.content, &self.protection),
            Some(Some(old)) => self.data.put(&self.location, &self.content, &old, &self.protection),
        };
        match restored {
            Ok(()) | Err(DataError::NotFound(_)) => Ok(()),
            Err(e) => Err(ProcessExecutionError::with_source(
                format!("could not undo put of {}", entry(&self.location, &self.content)),
                e,
            )),
        }
    }
}

/// Removes one DHT entry. Rollback puts the removed content back.
pub struct RemoveStep {
    data:       Arc<dyn DataManager>,
    location:   LocationKey,
    content:    ContentKey,
    protection: ProtectionKeys,
    removed:    Mutex<Option<Vec<u8>>>,
}

impl RemoveStep {
    pub fn new(data: Arc<dyn DataManager>, location: LocationKey, content: ContentKey, protection: ProtectionKeys) -> Self {
        Self {
            data,
            location,
            content,
            protection,
            removed: Mutex::new(None),
        }
    }
}

impl ProcessStep for RemoveStep {
    fn execute(&self, _ctx: &StepContext<'_>) -> StepResult {
        let current = self.data.get(&self.location, &self.content).map_err(|e| {
            ProcessExecutionError::with_source(format!("could not read {}", entry(&self.location, &self.content)), e)
        })?;
        self.data
            .remove(&self.location, &self.content, &self.protection)
            .map_err(|e| {
                ProcessExecutionError::with_source(format!("could not remove {}", entry(&self.location, &self.content)), e)
            })?;
        *self.removed.lock().unwrap_or_else(PoisonError::into_inner) = current;
        Ok(())
    }

    fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> StepResult {
        let Some(content) = self.removed.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Ok(());
        };
        self.data
            .put(&self.location, &self.content, &content, &self.protection)
            .map_err(|e| {
                ProcessExecutionError::with_source(format!("could not restore {}", entry(&self.location, &self.content)), e)
            })
    }
}

/// Reads one DHT entry. A missing entry fails the step.
pub struct GetStep {
    data:     Arc<dyn DataManager>,
    location: LocationKey,
    content:  ContentKey,
}

impl GetStep {
    pub fn new(data: Arc<dyn DataManager>, location: LocationKey, content: ContentKey) -> Self {
        Self {
            data,
            location,
            content,
        }
    }
}

impl ResultProcessStep for GetStep {
    type Output = Vec<u8>;

    fn execute(&self, _ctx: &StepContext<'_>) -> StepResult<Vec<u8>> {
        let what = entry(&self.location, &self.content);
        self.data
            .get(&self.location, &self.content)
            .map_err(|e| ProcessExecutionError::with_source(format!("could not get {what}"), e))?
            .ok_or_else(|| ProcessExecutionError::with_source(format!("could not get {what}"), DataError::NotFound(what.clone())))
    }
}

/// Hands an entry over to a new protection key. Rollback hands it back.
pub struct ChangeProtectionStep {
    data:     Arc<dyn DataManager>,
    location: LocationKey,
    content:  ContentKey,
    old:      ProtectionKeys,
    new:      ProtectionKeys,
}

impl ChangeProtectionStep {
    pub fn new(
        data: Arc<dyn DataManager>,
        location: LocationKey,
        content: ContentKey,
        old: ProtectionKeys,
        new: ProtectionKeys,
    ) -> Self {
        Self {
            data,
            location,
            content,
            old,
            new,
        }
    }
}

impl ProcessStep for ChangeProtectionStep {
    fn execute(&self, _ctx: &StepContext<'_>) -> StepResult {
        self.data
            .change_protection_key(&self.location, &self.content, &self.old, &self.new)
            .map_err(|e| {
                ProcessExecutionError::with_source(
                    format!("could not change protection of {}", entry(&self.location, &self.content)),
                    e,
                )
            })
    }

    fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> StepResult {
        self.data
            .change_protection_key(&self.location, &self.content, &self.new, &self.old)
            .map_err(|e| {
                ProcessExecutionError::with_source(
                    format!("could not restore protection of {}", entry(&self.location, &self.content)),
                    e,
                )
            })
    }
}
