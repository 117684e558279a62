//! End-to-end scenarios for the staged order pipeline, driven through the
//! public worker and intake facades only.

mod common {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use laboranalysis::pipeline::{
        HandlerError, HandlerRegistry, Notification, NotificationTemplates, Notifier,
        NotifyError, Order, QueueStore, StageHandler, StageWorker, WorkerRole,
    };

    pub(super) const OPERATOR: &str = "ops@lab.example";

    #[derive(Default)]
    pub(super) struct Mailbox {
        sent: Mutex<Vec<Notification>>,
    }

    impl Mailbox {
        pub(super) fn sent(&self) -> Vec<Notification> {
            self.sent.lock().expect("mailbox mutex poisoned").clone()
        }

        pub(super) fn addressed_to(&self, recipient: &str) -> Vec<Notification> {
            self.sent()
                .into_iter()
                .filter(|message| message.is_addressed_to(recipient))
                .collect()
        }
    }

    impl Notifier for Mailbox {
        fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .expect("mailbox mutex poisoned")
                .push(notification.clone());
            Ok(())
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    pub(super) struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Flaky {
        pub(super) fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl StageHandler for Flaky {
        fn handle(&self, order: &Order) -> Result<(), HandlerError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(HandlerError::Failed(format!(
                    "no results for '{}'",
                    order.subject
                )))
            } else {
                Ok(())
            }
        }
    }

    pub(super) fn worker<S: QueueStore + 'static>(
        role: WorkerRole,
        store: Arc<S>,
        mailbox: Arc<Mailbox>,
        handler: Arc<dyn StageHandler>,
    ) -> StageWorker<S, Mailbox> {
        StageWorker::new(
            role,
            store,
            mailbox,
            HandlerRegistry::uniform(handler),
            NotificationTemplates::new(OPERATOR),
        )
    }
}

use std::sync::Arc;

use common::*;
use laboranalysis::intake::{IntakeService, OrderRequest};
use laboranalysis::pipeline::{
    InMemoryQueueStore, NotificationTemplates, Order, OrderDocument, OrderKind, QueueStore,
    ReportArtifactHandler, SqliteQueueStore, Stage, WorkerRole,
};
use laboranalysis::reports::ReportCatalog;
use serde_json::json;

fn stages_holding<S: QueueStore>(store: &S, doc: &OrderDocument) -> Vec<Stage> {
    Stage::all()
        .into_iter()
        .filter(|stage| {
            store
                .list_all(*stage)
                .expect("list")
                .iter()
                .any(|candidate| candidate == doc)
        })
        .collect()
}

#[test]
fn order_travels_from_incoming_to_complete() {
    let store = Arc::new(InMemoryQueueStore::default());
    let mailbox = Arc::new(Mailbox::default());
    let doc = Order::new(OrderKind::VacancyRequest, "a@x.com", "Engineer").to_document();
    store.enqueue(Stage::Incoming, &doc).expect("seed");

    for role in WorkerRole::ordered() {
        worker(role, store.clone(), mailbox.clone(), Flaky::new(0))
            .poll_cycle()
            .expect("cycle");
        assert_eq!(stages_holding(store.as_ref(), &doc), vec![role.output()]);
    }

    assert_eq!(stages_holding(store.as_ref(), &doc), vec![Stage::Complete]);
    let customer_mail = mailbox.addressed_to("a@x.com");
    assert_eq!(customer_mail.len(), 1);
    assert!(customer_mail[0].body.contains("Engineer"));
    assert_eq!(mailbox.sent().len(), 3);
}

#[test]
fn analyze_failure_holds_order_until_retry_succeeds() {
    let store = Arc::new(InMemoryQueueStore::default());
    let mailbox = Arc::new(Mailbox::default());
    let doc = Order::new(OrderKind::VacancyRequest, "a@x.com", "Engineer").to_document();
    store.enqueue(Stage::Analyzing, &doc).expect("seed");
    let analyze = worker(WorkerRole::Analyze, store.clone(), mailbox.clone(), Flaky::new(1));

    analyze.poll_cycle().expect("first cycle");
    assert_eq!(stages_holding(store.as_ref(), &doc), vec![Stage::Analyzing]);
    let sent = mailbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![OPERATOR.to_string()]);
    assert!(sent[0].subject.contains("ran into an issue"));

    analyze.poll_cycle().expect("second cycle");
    assert_eq!(stages_holding(store.as_ref(), &doc), vec![Stage::Notifying]);
    assert_eq!(mailbox.sent().len(), 2);
}

#[test]
fn unidentifiable_order_never_moves_and_never_notifies() {
    let store = Arc::new(InMemoryQueueStore::default());
    let mailbox = Arc::new(Mailbox::default());
    let doc = match json!({ "customer": "a@x.com", "comment": "urgent" }) {
        serde_json::Value::Object(fields) => OrderDocument(fields),
        _ => unreachable!("literal is an object"),
    };
    store.enqueue(Stage::Incoming, &doc).expect("seed");

    for _ in 0..5 {
        for role in WorkerRole::ordered() {
            worker(role, store.clone(), mailbox.clone(), Flaky::new(0))
                .poll_cycle()
                .expect("cycle");
        }
    }

    assert_eq!(stages_holding(store.as_ref(), &doc), vec![Stage::Incoming]);
    assert!(mailbox.sent().is_empty());
}

#[test]
fn notify_stage_waits_for_report_artifact() {
    let reports = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(InMemoryQueueStore::default());
    let mailbox = Arc::new(Mailbox::default());
    let doc = Order::new(OrderKind::ResumeRequest, "a@x.com", "data analyst").to_document();
    store.enqueue(Stage::Notifying, &doc).expect("seed");
    let notify = worker(
        WorkerRole::Notify,
        store.clone(),
        mailbox.clone(),
        Arc::new(ReportArtifactHandler::new(ReportCatalog::new(reports.path()))),
    );

    notify.poll_cycle().expect("cycle without report");
    assert_eq!(stages_holding(store.as_ref(), &doc), vec![Stage::Notifying]);
    assert!(mailbox.sent().is_empty());

    let resumes = reports.path().join("resumes");
    std::fs::create_dir_all(&resumes).expect("mkdir");
    std::fs::write(resumes.join("data analyst.xlsx"), b"report").expect("write report");

    notify.poll_cycle().expect("cycle with report");
    assert_eq!(stages_holding(store.as_ref(), &doc), vec![Stage::Complete]);
    let sent = mailbox.addressed_to("a@x.com");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Your requested report is ready!");
}

#[test]
fn workers_in_separate_processes_share_a_sqlite_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("queues").join("laboranalysis.db");
    let mailbox = Arc::new(Mailbox::default());

    let intake_store = Arc::new(SqliteQueueStore::open(&path, "hh_orders").expect("open"));
    let intake = IntakeService::new(
        intake_store,
        mailbox.clone(),
        NotificationTemplates::new(OPERATOR),
    );
    intake
        .submit(OrderRequest::new("a@x.com", "resume", "data analyst"))
        .expect("submit");

    for role in WorkerRole::ordered() {
        let store = Arc::new(SqliteQueueStore::open(&path, "hh_orders").expect("reopen"));
        worker(role, store, mailbox.clone(), Flaky::new(0))
            .poll_cycle()
            .expect("cycle");
    }

    let store = SqliteQueueStore::open(&path, "hh_orders").expect("reopen");
    let complete = store.list_all(Stage::Complete).expect("list");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].get_str("criteria"), Some("data analyst"));
    for stage in [
        Stage::Incoming,
        Stage::Harvesting,
        Stage::Analyzing,
        Stage::Notifying,
    ] {
        assert_eq!(store.depth(stage).expect("depth"), 0, "{stage} should be empty");
    }
    assert_eq!(mailbox.addressed_to("a@x.com").len(), 1);
}
