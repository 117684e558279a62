use laboranalysis::config::{AppConfig, NotifierConfig, StoreConfig};
use laboranalysis::error::AppError;
use laboranalysis::intake::IntakeService;
use laboranalysis::pipeline::{
    HandlerRegistry, Notification, NotificationTemplates, Notifier, NotifyError, OutboxNotifier,
    SqliteQueueStore, StageWorker, TracingNotifier, WorkerRole,
};
use laboranalysis::reports::ReportCatalog;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) reports: ReportCatalog,
}

/// Notifier selected by deployment configuration.
#[derive(Debug)]
pub(crate) enum ConfiguredNotifier {
    Outbox(OutboxNotifier),
    Tracing(TracingNotifier),
}

impl Notifier for ConfiguredNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::Outbox(outbox) => outbox.notify(notification),
            Self::Tracing(logger) => logger.notify(notification),
        }
    }
}

pub(crate) type Worker = StageWorker<SqliteQueueStore, ConfiguredNotifier>;
pub(crate) type Intake = IntakeService<SqliteQueueStore, ConfiguredNotifier>;

pub(crate) fn build_notifier(config: &NotifierConfig) -> Result<ConfiguredNotifier, AppError> {
    match &config.outbox_dir {
        Some(dir) => {
            info!(outbox = %dir.display(), "spooling notifications to outbox");
            Ok(ConfiguredNotifier::Outbox(OutboxNotifier::new(dir.clone())?))
        }
        None => {
            warn!("APP_OUTBOX_DIR not set; notifications are only logged");
            Ok(ConfiguredNotifier::Tracing(TracingNotifier))
        }
    }
}

pub(crate) fn open_store(config: &StoreConfig) -> Result<SqliteQueueStore, AppError> {
    let store = if config.is_in_memory() {
        SqliteQueueStore::in_memory(config.database.clone())?
    } else {
        SqliteQueueStore::open(Path::new(&config.path), config.database.clone())?
    };
    info!(path = %config.path, database = %config.database, "queue store opened");
    Ok(store)
}

pub(crate) fn templates(config: &AppConfig) -> NotificationTemplates {
    NotificationTemplates::new(config.notifier.operator_email.clone())
}

pub(crate) fn build_worker(config: &AppConfig, role: WorkerRole) -> Result<Worker, AppError> {
    let store = Arc::new(open_store(&config.store)?);
    let notifier = Arc::new(build_notifier(&config.notifier)?);
    let handlers = HandlerRegistry::for_role(role, &config.handlers);

    Ok(StageWorker::new(role, store, notifier, handlers, templates(config))
        .with_max_attempts(config.pipeline.max_attempts))
}

pub(crate) fn build_intake(config: &AppConfig) -> Result<Intake, AppError> {
    let store = Arc::new(open_store(&config.store)?);
    let notifier = Arc::new(build_notifier(&config.notifier)?);
    Ok(IntakeService::new(store, notifier, templates(config)))
}

/// Resolves on Ctrl-C. If the handler cannot be installed the future never
/// resolves and the process runs until killed.
pub(crate) async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
