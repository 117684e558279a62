use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::service::{IntakeService, OrderRequest};
use crate::pipeline::{Notifier, QueueStore};

/// Router builder exposing order submission and queue inspection.
pub fn intake_router<S, N>(service: Arc<IntakeService<S, N>>) -> Router
where
    S: QueueStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/orders", post(submit_handler::<S, N>))
        .route("/api/v1/queues", get(queues_handler::<S, N>))
        .with_state(service)
}

pub(crate) async fn submit_handler<S, N>(
    State(service): State<Arc<IntakeService<S, N>>>,
    axum::Json(request): axum::Json<OrderRequest>,
) -> Response
where
    S: QueueStore + 'static,
    N: Notifier + 'static,
{
    match service.submit(request) {
        Ok(submitted) => (StatusCode::ACCEPTED, axum::Json(submitted)).into_response(),
        Err(err) if err.is_validation() => {
            let payload = json!({
                "error": err.to_string(),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn queues_handler<S, N>(
    State(service): State<Arc<IntakeService<S, N>>>,
) -> Response
where
    S: QueueStore + 'static,
    N: Notifier + 'static,
{
    match service.queue_depths() {
        Ok(depths) => (StatusCode::OK, axum::Json(json!({ "queues": depths }))).into_response(),
        Err(err) => {
            let payload = json!({
                "error": err.to_string(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
    }
}
