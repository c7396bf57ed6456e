use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use stockledger_core::{PartNumber, SequenceId, ShipmentLineId};
use stockledger_infra::workflows::WorkflowError;
use stockledger_shipping::ShipmentSequence;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_shipment).get(list_shipments))
        .route("/:id", get(get_shipment))
        .route("/:id/scan", post(record_scan))
        .route("/:id/lines/:line", put(edit_actual).delete(remove_line))
        .route("/:id/confirm", post(confirm_shipment))
}

fn sequence_response(
    result: Result<ShipmentSequence, WorkflowError>,
    status: StatusCode,
) -> axum::response::Response {
    match result {
        Ok(sequence) => (status, Json(dto::ShipmentResponse::from(&sequence))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

fn parse_ids(id: &str, line: &str) -> Result<(SequenceId, ShipmentLineId), axum::response::Response> {
    Ok((errors::parse(id)?, errors::parse(line)?))
}

pub async fn register_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterShipmentRequest>,
) -> axum::response::Response {
    let lines = match dto::parse_lines(&body.lines) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    sequence_response(
        services
            .shipments
            .register(body.business_date, body.label, &lines)
            .await,
        StatusCode::CREATED,
    )
}

pub async fn list_shipments(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.shipments.list().await {
        Ok(heads) => Json(heads).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn get_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: SequenceId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    sequence_response(services.shipments.get(id).await, StatusCode::OK)
}

/// A scan for a part already on the sequence adds to its line.
pub async fn record_scan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::LineRequest>,
) -> axum::response::Response {
    let id: SequenceId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let part: PartNumber = match errors::parse(&body.part_number) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    sequence_response(
        services.shipments.record_scan(id, part, body.quantity).await,
        StatusCode::OK,
    )
}

pub async fn edit_actual(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, line)): Path<(String, String)>,
    Json(body): Json<dto::EditActualRequest>,
) -> axum::response::Response {
    let (id, line) = match parse_ids(&id, &line) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    sequence_response(
        services.shipments.edit_actual(id, line, body.actual_quantity).await,
        StatusCode::OK,
    )
}

pub async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, line)): Path<(String, String)>,
) -> axum::response::Response {
    let (id, line) = match parse_ids(&id, &line) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    sequence_response(services.shipments.remove_line(id, line).await, StatusCode::OK)
}

pub async fn confirm_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ConfirmShipmentRequest>,
) -> axum::response::Response {
    let id: SequenceId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.shipments.confirm(id, body.selection()).await {
        Ok(outcome) => {
            Json(dto::OutcomeResponse::from_outcome(outcome, |s| dto::ShipmentResponse::from(s))).into_response()
        }
        Err(e) => errors::workflow_error_to_response(e),
    }
}
