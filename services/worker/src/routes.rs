use crate::infra::AppState;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use laboranalysis::intake::{intake_router, IntakeService};
use laboranalysis::pipeline::{Notifier, OrderKind, QueueStore};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_intake_routes<S, N>(service: Arc<IntakeService<S, N>>) -> axum::Router
where
    S: QueueStore + 'static,
    N: Notifier + 'static,
{
    intake_router(service)
        .merge(status_routes())
        .route(
            "/api/v1/reports/:kind",
            axum::routing::get(list_reports_endpoint),
        )
        .route(
            "/reports/:kind/:file",
            axum::routing::get(download_report_endpoint),
        )
}

/// Liveness, readiness and Prometheus scrape endpoints.
pub(crate) fn status_routes() -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn report_kind(raw: &str) -> Option<OrderKind> {
    OrderKind::from_report_dir(raw).or_else(|| OrderKind::from_tag(raw))
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

pub(crate) async fn list_reports_endpoint(
    Extension(state): Extension<AppState>,
    Path(kind): Path<String>,
) -> Response {
    let Some(order_kind) = report_kind(&kind) else {
        return not_found(format!("unknown report type '{kind}'"));
    };

    match state.reports.list(order_kind) {
        Ok(reports) => Json(json!({
            "kind": order_kind.report_dir(),
            "reports": reports,
        }))
        .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) async fn download_report_endpoint(
    Extension(state): Extension<AppState>,
    Path((kind, file)): Path<(String, String)>,
) -> Response {
    let Some(order_kind) = report_kind(&kind) else {
        return not_found(format!("unknown report type '{kind}'"));
    };
    let Some(path) = state.reports.resolve(order_kind, &file) else {
        return not_found(format!("no report named '{file}'"));
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.essence_str().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{file}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
