use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::pipeline::order::OrderDocument;
use crate::pipeline::queue::{QueueStore, StoreError};
use crate::pipeline::stage::Stage;

/// Process-local queue store used by tests and single-process development runs.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: Mutex<HashMap<Stage, Vec<OrderDocument>>>,
    attempts: Mutex<HashMap<(Stage, String), u32>>,
}

impl InMemoryQueueStore {
    fn lock_queues(&self) -> Result<MutexGuard<'_, HashMap<Stage, Vec<OrderDocument>>>, StoreError> {
        self.queues.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn lock_attempts(&self) -> Result<MutexGuard<'_, HashMap<(Stage, String), u32>>, StoreError> {
        self.attempts.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Every queue holding a document equal to `document`, once per copy.
    pub fn stages_containing(&self, document: &OrderDocument) -> Result<Vec<Stage>, StoreError> {
        let queues = self.lock_queues()?;
        let mut stages = Vec::new();
        for stage in Stage::all() {
            let copies = queues
                .get(&stage)
                .map(|docs| docs.iter().filter(|doc| *doc == document).count())
                .unwrap_or(0);
            stages.extend(std::iter::repeat(stage).take(copies));
        }
        Ok(stages)
    }

    pub fn attempts(&self, stage: Stage, document: &OrderDocument) -> Result<u32, StoreError> {
        let attempts = self.lock_attempts()?;
        Ok(attempts
            .get(&(stage, document.canonical()))
            .copied()
            .unwrap_or(0))
    }
}

impl QueueStore for InMemoryQueueStore {
    fn list_all(&self, stage: Stage) -> Result<Vec<OrderDocument>, StoreError> {
        let queues = self.lock_queues()?;
        Ok(queues.get(&stage).cloned().unwrap_or_default())
    }

    fn enqueue(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError> {
        let mut queues = self.lock_queues()?;
        queues.entry(stage).or_default().push(document.clone());
        Ok(())
    }

    fn remove(&self, stage: Stage, document: &OrderDocument) -> Result<bool, StoreError> {
        let mut queues = self.lock_queues()?;
        let Some(docs) = queues.get_mut(&stage) else {
            return Ok(false);
        };
        match docs.iter().position(|doc| doc == document) {
            Some(index) => {
                docs.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn record_attempt(&self, stage: Stage, document: &OrderDocument) -> Result<u32, StoreError> {
        let mut attempts = self.lock_attempts()?;
        let count = attempts.entry((stage, document.canonical())).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn clear_attempts(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError> {
        let mut attempts = self.lock_attempts()?;
        attempts.remove(&(stage, document.canonical()));
        Ok(())
    }
}
