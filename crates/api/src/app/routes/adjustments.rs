use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/sheet", get(get_sheet))
        .route("/paste", post(paste_values))
        .route("/apply", post(apply_values))
}

pub async fn get_sheet(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.adjustments.sheet().await {
        Ok(sheet) => Json(sheet.rows().to_vec()).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

/// Report which pasted values land on the sheet. Writes nothing.
pub async fn paste_values(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PasteRequest>,
) -> axum::response::Response {
    match services.adjustments.paste(&body.text).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn apply_values(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ApplyAdjustmentRequest>,
) -> axum::response::Response {
    match services
        .adjustments
        .apply(&body.values, body.reason.as_deref(), body.date)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
