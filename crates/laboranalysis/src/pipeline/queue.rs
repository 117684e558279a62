use serde::Serialize;

use super::order::OrderDocument;
use super::stage::Stage;
use super::transition::{enqueue_then_remove, TransferOutcome};

/// Errors raised by queue store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored document is not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("queue store lock poisoned")]
    LockPoisoned,
    #[error("queue store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for the stage queues, one collection per [`Stage`].
///
/// Implementations must be `Send + Sync`; workers in separate processes share
/// nothing but the store itself.
pub trait QueueStore: Send + Sync {
    /// Every document currently held by `stage`, in store enumeration order.
    fn list_all(&self, stage: Stage) -> Result<Vec<OrderDocument>, StoreError>;

    fn enqueue(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError>;

    /// Remove one document structurally equal to `document`.
    ///
    /// Returns `Ok(false)` when nothing matched; absence is never an error.
    fn remove(&self, stage: Stage, document: &OrderDocument) -> Result<bool, StoreError>;

    fn contains(&self, stage: Stage, document: &OrderDocument) -> Result<bool, StoreError> {
        Ok(self
            .list_all(stage)?
            .iter()
            .any(|candidate| candidate == document))
    }

    /// Move `document` from one queue to another.
    ///
    /// The default is the non-atomic enqueue-then-remove pair; backends with
    /// transactions override it.
    fn transfer(
        &self,
        from: Stage,
        to: Stage,
        document: &OrderDocument,
    ) -> Result<TransferOutcome, StoreError> {
        enqueue_then_remove(self, from, to, document)
    }

    /// Bump and return the failure count recorded for `document` at `stage`.
    fn record_attempt(&self, stage: Stage, document: &OrderDocument) -> Result<u32, StoreError>;

    fn clear_attempts(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError>;

    fn depth(&self, stage: Stage) -> Result<usize, StoreError> {
        Ok(self.list_all(stage)?.len())
    }
}

/// A single stage's view of the store.
pub struct StageQueue<'a, S: ?Sized> {
    store: &'a S,
    stage: Stage,
}

impl<'a, S> StageQueue<'a, S>
where
    S: QueueStore + ?Sized,
{
    pub fn new(store: &'a S, stage: Stage) -> Self {
        Self { store, stage }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn list_all(&self) -> Result<Vec<OrderDocument>, StoreError> {
        self.store.list_all(self.stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub stage: Stage,
    pub orders: usize,
}

/// Snapshot of how many orders each queue holds, in pipeline order.
pub fn queue_depths<S>(store: &S) -> Result<Vec<QueueDepth>, StoreError>
where
    S: QueueStore + ?Sized,
{
    Stage::all()
        .into_iter()
        .map(|stage| {
            store
                .depth(stage)
                .map(|orders| QueueDepth { stage, orders })
        })
        .collect()
}
