use crate::cli::{ImportArgs, SubmitArgs, WorkArgs};
use crate::infra::{build_intake, build_worker, open_store, shutdown_signal, AppState};
use crate::routes::status_routes;
use axum::Extension;
use laboranalysis::config::AppConfig;
use laboranalysis::error::AppError;
use laboranalysis::intake::OrderRequest;
use laboranalysis::pipeline::{queue_depths, ScheduleMode, Scheduler};
use laboranalysis::reports::ReportCatalog;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::File;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

pub(crate) async fn work(config: AppConfig, args: WorkArgs) -> Result<(), AppError> {
    let worker = Arc::new(build_worker(&config, args.role)?);

    let mut schedule = config.pipeline.schedule.clone();
    if args.once {
        schedule.mode = ScheduleMode::Once;
    }

    let readiness = match args.status_port {
        Some(port) => Some(serve_status(&config, port).await?),
        None => None,
    };

    info!(
        role = %args.role,
        mode = %schedule.mode,
        settle_secs = schedule.settle.as_secs(),
        idle_secs = schedule.idle.as_secs(),
        max_attempts = ?config.pipeline.max_attempts,
        "stage worker starting"
    );
    if let Some(flag) = &readiness {
        flag.store(true, Ordering::Release);
    }

    let summary = Scheduler::new(schedule)
        .run_until(worker, shutdown_signal())
        .await;

    info!(
        role = %args.role,
        cycles = summary.cycles,
        failed_cycles = summary.failed_cycles,
        advanced = summary.advanced,
        failed = summary.failed,
        dead_lettered = summary.dead_lettered,
        "stage worker stopped"
    );
    Ok(())
}

/// Expose health, readiness and metrics for a worker process in the
/// background. Returns the readiness flag for the caller to flip.
async fn serve_status(config: &AppConfig, port: u16) -> Result<Arc<AtomicBool>, AppError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| AppError::Metrics(err.to_string()))?;

    let readiness = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness.clone(),
        metrics: Arc::new(handle),
        reports: ReportCatalog::new(config.handlers.reports_dir.clone()),
    };
    let app = status_routes().layer(Extension(state));

    let ip = config.server.socket_addr()?.ip();
    let addr = SocketAddr::new(ip, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "worker status endpoints listening");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "worker status server stopped");
        }
    });

    Ok(readiness)
}

pub(crate) fn submit(config: &AppConfig, args: SubmitArgs) -> Result<(), AppError> {
    let intake = build_intake(config)?;
    let submitted = intake.submit(OrderRequest::new(args.customer, args.kind, args.subject))?;

    println!(
        "Accepted {} order {} for '{}' (queue: {})",
        submitted.kind, submitted.order_id, submitted.subject, submitted.stage
    );
    Ok(())
}

pub(crate) fn import(config: &AppConfig, args: ImportArgs) -> Result<(), AppError> {
    let intake = build_intake(config)?;
    let file = File::open(&args.path)?;
    let summary = intake.import_csv(file)?;

    println!(
        "Imported {} order(s) from {}",
        summary.accepted.len(),
        args.path.display()
    );
    if !summary.rejected.is_empty() {
        println!("Rejected rows:");
        for row in &summary.rejected {
            println!("  line {}: {}", row.line, row.reason);
        }
    }
    Ok(())
}

pub(crate) fn queues(config: &AppConfig) -> Result<(), AppError> {
    let store = open_store(&config.store)?;

    println!("Queue depths ({})", store.database());
    for depth in queue_depths(&store)? {
        println!("  {:<12} {:>6}", depth.stage.collection(), depth.orders);
    }
    Ok(())
}
