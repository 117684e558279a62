//! Staged order pipeline: per-stage queues, the workers that drain them and
//! the scheduler that drives those workers.

pub mod handler;
pub mod notifier;
pub mod order;
pub mod queue;
pub mod scheduler;
pub mod stage;
pub mod store;
pub mod transition;
pub mod worker;

pub use handler::{
    CommandHandler, HandlerError, HandlerRegistry, ReportArtifactHandler, StageHandler,
    UnconfiguredHandler,
};
pub use notifier::{
    Notification, NotificationTemplates, Notifier, NotifyError, OutboxNotifier, TracingNotifier,
};
pub use order::{Order, OrderDocument, OrderError, OrderId, OrderKind};
pub use queue::{queue_depths, QueueDepth, QueueStore, StageQueue, StoreError};
pub use scheduler::{ScheduleConfig, ScheduleMode, Scheduler, SchedulerSummary};
pub use stage::{Stage, WorkerRole};
pub use store::{InMemoryQueueStore, SqliteQueueStore};
pub use transition::{enqueue_then_remove, transition, TransferOutcome};
pub use worker::{CycleReport, OrderOutcome, StageWorker};

#[cfg(test)]
mod tests;
