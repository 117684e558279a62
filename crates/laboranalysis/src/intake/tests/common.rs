use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::intake::{intake_router, IntakeService, OrderRequest};
use crate::pipeline::{
    InMemoryQueueStore, Notification, NotificationTemplates, Notifier, NotifyError,
    OrderDocument, QueueStore, Stage, StoreError,
};

pub(super) const OPERATOR: &str = "ops@lab.example";

pub(super) fn request() -> OrderRequest {
    OrderRequest::new("a@x.com", "vacancy", "Engineer")
}

#[derive(Default)]
pub(super) struct MemoryOutbox {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryOutbox {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("outbox mutex poisoned").clone()
    }
}

impl Notifier for MemoryOutbox {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("outbox mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl QueueStore for UnavailableStore {
    fn list_all(&self, _stage: Stage) -> Result<Vec<OrderDocument>, StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }

    fn enqueue(&self, _stage: Stage, _document: &OrderDocument) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }

    fn remove(&self, _stage: Stage, _document: &OrderDocument) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }

    fn record_attempt(&self, _stage: Stage, _document: &OrderDocument) -> Result<u32, StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }

    fn clear_attempts(&self, _stage: Stage, _document: &OrderDocument) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }
}

pub(super) fn build_service() -> (
    IntakeService<InMemoryQueueStore, MemoryOutbox>,
    Arc<InMemoryQueueStore>,
    Arc<MemoryOutbox>,
) {
    let store = Arc::new(InMemoryQueueStore::default());
    let outbox = Arc::new(MemoryOutbox::default());
    let service = IntakeService::new(
        store.clone(),
        outbox.clone(),
        NotificationTemplates::new(OPERATOR),
    );
    (service, store, outbox)
}

pub(super) fn router_with_service(
    service: IntakeService<InMemoryQueueStore, MemoryOutbox>,
) -> axum::Router {
    intake_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
