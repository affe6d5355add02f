//! In-memory checkpoint store.

use crate::{Checkpoint, CheckpointId, CheckpointStore, CheckpointSummary, Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local checkpoint store for tests and single-process embedding.
///
/// Consumed checkpoints are dropped from the map; the critical section around
/// the map is what makes [`take`](CheckpointStore::take) atomic.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<CheckpointId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints not yet consumed.
    pub fn len(&self) -> usize {
        self.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CheckpointId, Checkpoint>>> {
        self.checkpoints
            .lock()
            .map_err(|_| Error::Unavailable("checkpoint map lock poisoned".into()))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<CheckpointId> {
        let id = CheckpointId::generate();
        self.lock()?.insert(id.clone(), checkpoint.clone());
        Ok(id)
    }

    fn load(&self, id: &CheckpointId) -> Result<Checkpoint> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn consume(&self, id: &CheckpointId) -> Result<()> {
        self.take(id).map(|_| ())
    }

    fn take(&self, id: &CheckpointId) -> Result<Checkpoint> {
        self.lock()?
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn pending(&self) -> Result<Vec<CheckpointSummary>> {
        let mut summaries: Vec<_> = self
            .lock()?
            .iter()
            .map(|(id, cp)| CheckpointSummary {
                id: id.clone(),
                run_id: cp.run_id,
                tool_name: cp.pending_call.tool_name.clone(),
                created_at: cp.created_at,
            })
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }
}
