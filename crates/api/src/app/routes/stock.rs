use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    Json,
};

use stockledger_core::PartNumber;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn list_stock(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ledger.all_stock().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

/// Parts never touched read as zero.
pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
) -> axum::response::Response {
    let part: PartNumber = match errors::parse(&part) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.ledger.stock_record(&part).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => Json(serde_json::json!({
            "part_number": part,
            "current_stock": 0,
            "status": "out_of_stock",
            "version": 0,
        }))
        .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::TransactionParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.ledger.transactions(&query).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
