use std::sync::Arc;

use swarmsync_data::{ChunkCipher, CipherKey, DataManager, ProtectionKeys, chunk_keys};
use swarmsync_process::{ProcessExecutionError, ProcessStep, Step, StepContext};

use crate::meta::FileMeta;
use crate::steps::RemoveStep;
use crate::steps::download::resolve_meta;

/// Looks up a file's meta record and appends removal of the meta record and
/// of every chunk to its process.
pub struct ResolveDeleteStep {
    data:       Arc<dyn DataManager>,
    cipher:     Arc<dyn ChunkCipher>,
    owner_key:  CipherKey,
    protection: ProtectionKeys,
    name:       String,
}

impl ResolveDeleteStep {
    pub fn new(
        data: Arc<dyn DataManager>,
        cipher: Arc<dyn ChunkCipher>,
        owner_key: CipherKey,
        protection: ProtectionKeys,
        name: impl Into<String>,
    ) -> Self {
        Self {
            data,
            cipher,
            owner_key,
            protection,
            name: name.into(),
        }
    }
}

impl ProcessStep for ResolveDeleteStep {
    fn execute(&self, ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
        let meta = resolve_meta(self.data.as_ref(), self.cipher.as_ref(), &self.owner_key, &self.name)?;

        let (location, content) = FileMeta::keys(&self.name);
        ctx.append_to_parent(Step::new(RemoveStep::new(
            self.data.clone(),
            location,
            content,
            self.protection.clone(),
        )))?;

        let mut seen = std::collections::HashSet::new();
        for chunk in meta.chunks.iter().filter(|c| seen.insert(c.id.clone())) {
            let (location, content) = chunk_keys(&chunk.id);
            ctx.append_to_parent(Step::new(RemoveStep::new(
                self.data.clone(),
                location,
                content,
                self.protection.clone(),
            )))?;
        }
        tracing::debug!(file = %self.name, chunks = seen.len(), "removal scheduled");
        Ok(())
    }
}
