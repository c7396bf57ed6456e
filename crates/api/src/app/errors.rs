use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_core::DomainError;
use stockledger_infra::store::StoreError;
use stockledger_infra::workflows::WorkflowError;

pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    let status = match &err {
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::Invariant(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WorkflowError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        WorkflowError::PartialFailure { .. } => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    json_error(status, err.code(), err.to_string())
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    workflow_error_to_response(err.into())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or query value, answering 400 when it is malformed.
pub fn parse<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>()
        .map_err(|e| workflow_error_to_response(WorkflowError::from(e)))
}
