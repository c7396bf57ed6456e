use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use stockledger_core::{ContainerId, PartNumber, ReceivingLineId};
use stockledger_infra::workflows::WorkflowError;
use stockledger_receiving::ReceivingContainer;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/containers", post(register_container).get(list_containers))
        .route("/containers/:id", get(get_container).delete(delete_container))
        .route("/containers/:id/lines", post(add_line))
        .route("/containers/:id/lines/:line", put(change_quantity).delete(remove_line))
        .route("/containers/:id/confirm", post(confirm_arrival))
}

fn container_response(
    result: Result<ReceivingContainer, WorkflowError>,
    status: StatusCode,
) -> axum::response::Response {
    match result {
        Ok(container) => (status, Json(dto::ContainerResponse::from(&container))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

fn parse_ids(id: &str, line: &str) -> Result<(ContainerId, ReceivingLineId), axum::response::Response> {
    Ok((errors::parse(id)?, errors::parse(line)?))
}

pub async fn register_container(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterContainerRequest>,
) -> axum::response::Response {
    let lines = match dto::parse_lines(&body.lines) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    container_response(
        services.receiving.register(&body.container_no, &lines).await,
        StatusCode::CREATED,
    )
}

pub async fn list_containers(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.receiving.list().await {
        Ok(heads) => Json(heads).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn get_container(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ContainerId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    container_response(services.receiving.get(id).await, StatusCode::OK)
}

pub async fn delete_container(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ContainerId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.receiving.delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::LineRequest>,
) -> axum::response::Response {
    let id: ContainerId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let part: PartNumber = match errors::parse(&body.part_number) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    container_response(
        services.receiving.add_part(id, part, body.quantity).await,
        StatusCode::OK,
    )
}

pub async fn change_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, line)): Path<(String, String)>,
    Json(body): Json<dto::ChangeQuantityRequest>,
) -> axum::response::Response {
    let (id, line) = match parse_ids(&id, &line) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    container_response(
        services.receiving.change_quantity(id, line, body.quantity).await,
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
    container_response(services.receiving.remove_part(id, line).await, StatusCode::OK)
}

/// Confirming twice is answered with `changed: false` and no new rows.
pub async fn confirm_arrival(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ConfirmArrivalRequest>,
) -> axum::response::Response {
    let id: ContainerId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.receiving.confirm(id, body.arrival_date).await {
        Ok(outcome) => {
            Json(dto::OutcomeResponse::from_outcome(outcome, |c| dto::ContainerResponse::from(c))).into_response()
        }
        Err(e) => errors::workflow_error_to_response(e),
    }
}
