use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::pipeline::handler::{HandlerError, HandlerRegistry, StageHandler};
use crate::pipeline::notifier::{Notification, NotificationTemplates, Notifier, NotifyError};
use crate::pipeline::order::{Order, OrderDocument, OrderKind};
use crate::pipeline::queue::{QueueStore, StoreError};
use crate::pipeline::stage::{Stage, WorkerRole};
use crate::pipeline::store::InMemoryQueueStore;
use crate::pipeline::worker::StageWorker;

pub(super) const OPERATOR: &str = "ops@lab.example";
pub(super) const CUSTOMER: &str = "a@x.com";

pub(super) fn vacancy_order() -> OrderDocument {
    Order::new(OrderKind::VacancyRequest, CUSTOMER, "Engineer").to_document()
}

pub(super) fn templates() -> NotificationTemplates {
    NotificationTemplates::new(OPERATOR)
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn with_subject(&self, needle: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|message| message.subject.contains(needle))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

pub(super) struct BrokenNotifier;

impl Notifier for BrokenNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay refused connection".to_string()))
    }
}

/// Fails the first `failures` invocations, then succeeds.
#[derive(Default)]
pub(super) struct ScriptedHandler {
    failures: usize,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub(super) fn succeeding() -> Self {
        Self::default()
    }

    pub(super) fn failing(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StageHandler for ScriptedHandler {
    fn handle(&self, order: &Order) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(HandlerError::Failed(format!(
                "upstream timeout for '{}'",
                order.subject
            )))
        } else {
            Ok(())
        }
    }
}

pub(super) struct NotReadyHandler;

impl StageHandler for NotReadyHandler {
    fn handle(&self, order: &Order) -> Result<(), HandlerError> {
        Err(HandlerError::NotReady {
            subject: order.subject.clone(),
        })
    }
}

/// In-memory store whose `remove` can be made to fail, simulating a crash
/// between the two halves of a transition.
#[derive(Default)]
pub(super) struct FaultyStore {
    pub(super) inner: InMemoryQueueStore,
    fail_removes: AtomicBool,
}

impl FaultyStore {
    pub(super) fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }
}

impl QueueStore for FaultyStore {
    fn list_all(&self, stage: Stage) -> Result<Vec<OrderDocument>, StoreError> {
        self.inner.list_all(stage)
    }

    fn enqueue(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError> {
        self.inner.enqueue(stage, document)
    }

    fn remove(&self, stage: Stage, document: &OrderDocument) -> Result<bool, StoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.remove(stage, document)
    }

    fn record_attempt(&self, stage: Stage, document: &OrderDocument) -> Result<u32, StoreError> {
        self.inner.record_attempt(stage, document)
    }

    fn clear_attempts(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError> {
        self.inner.clear_attempts(stage, document)
    }
}

pub(super) fn worker_with<S: QueueStore + 'static>(
    role: WorkerRole,
    store: Arc<S>,
    handler: Arc<dyn StageHandler>,
) -> (StageWorker<S, RecordingNotifier>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let worker = StageWorker::new(
        role,
        store,
        notifier.clone(),
        HandlerRegistry::uniform(handler),
        templates(),
    );
    (worker, notifier)
}
