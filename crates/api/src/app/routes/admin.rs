use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/reconcile", post(run_reconciliation))
        .route("/outbox/relay", post(relay_outbox))
}

/// Compare stock with the log; with `repair` set, append explaining rows.
pub async fn run_reconciliation(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ReconcileRequest>,
) -> axum::response::Response {
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    match services.reconciliation.run(body.repair, date).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn relay_outbox(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.relay.relay_once().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
