use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use stockledger_core::{CountItemId, PartNumber, SessionId};
use stockledger_counting::ItemEdit;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_session).get(list_sessions))
        .route("/:id", get(get_session))
        .route("/:id/items", post(add_item))
        .route("/:id/items/:item", put(save_item))
        .route("/:id/items/:item/pending", put(stage_edit))
        .route("/:id/complete", post(complete_session))
}

fn parse_ids(id: &str, item: &str) -> Result<(SessionId, CountItemId), axum::response::Response> {
    Ok((errors::parse(id)?, errors::parse(item)?))
}

/// Answer with the sheet as the counter sees it, staged edits included.
async fn session_view(services: &AppServices, id: SessionId, status: StatusCode) -> axum::response::Response {
    match services.counts.view(id).await {
        Ok(view) => (status, Json(dto::SessionResponse::from(view))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn open_session(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::OpenCountRequest>,
) -> axum::response::Response {
    match services.counts.open(body.count_date, &body.label).await {
        Ok(session) => session_view(&services, session.id_typed(), StatusCode::CREATED).await,
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn list_sessions(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.counts.list().await {
        Ok(heads) => Json(heads).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn get_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: SessionId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    session_view(&services, id, StatusCode::OK).await
}

/// The item's system figure is the part's stock at the moment it is added.
pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddCountItemRequest>,
) -> axum::response::Response {
    let id: SessionId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let part: PartNumber = match errors::parse(&body.part_number) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .counts
        .add_item(id, part, body.physical_stock, body.notes)
        .await
    {
        Ok(_) => session_view(&services, id, StatusCode::OK).await,
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn save_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<dto::CountItemEditRequest>,
) -> axum::response::Response {
    let (id, item_id) = match parse_ids(&id, &item) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    let edit = ItemEdit {
        item_id,
        physical_stock: body.physical_stock,
        notes: body.notes,
    };
    match services.counts.save_item(id, edit).await {
        Ok(_) => session_view(&services, id, StatusCode::OK).await,
        Err(e) => errors::workflow_error_to_response(e),
    }
}

/// Buffer an edit; nothing reaches the ledger until save or completion.
pub async fn stage_edit(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<dto::CountItemEditRequest>,
) -> axum::response::Response {
    let (id, item_id) = match parse_ids(&id, &item) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    match services.counts.stage_edit(id, item_id, body.into()).await {
        Ok(_) => session_view(&services, id, StatusCode::ACCEPTED).await,
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn complete_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: SessionId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.counts.complete(id).await {
        Ok(outcome) => {
            Json(dto::OutcomeResponse::from_outcome(outcome, |s| dto::SessionResponse::from_session(s))).into_response()
        }
        Err(e) => errors::workflow_error_to_response(e),
    }
}
