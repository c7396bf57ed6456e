//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, workflow services, background workers
//! - `routes/`: HTTP handlers, one file per workflow
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: JSON error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use stockledger_core::PartNumber;
    use stockledger_events::InMemoryEventBus;
    use stockledger_infra::catalog::InMemoryPartCatalog;
    use stockledger_infra::config::LedgerSettings;
    use stockledger_infra::store::InMemoryLedgerStore;
    use stockledger_inventory::Part;

    fn app() -> Router {
        let settings = LedgerSettings::from_toml(
            r#"
            [quick_adjustment]
            parts = ["A1"]
            "#,
        )
        .unwrap();
        let catalog = Arc::new(InMemoryPartCatalog::with_parts([Part::new(
            PartNumber::parse("A1").unwrap(),
            "bolts",
        )]));
        let services = services::AppServices::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryEventBus::new()),
            catalog,
            &settings,
        )
        .unwrap();
        build_app(Arc::new(services))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => request
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, _) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn untouched_part_reads_as_zero() {
        let (status, body) = send(&app(), "GET", "/stock/A1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_stock"], 0);
    }

    #[tokio::test]
    async fn malformed_id_is_a_bad_request() {
        let (status, body) = send(&app(), "GET", "/receiving/containers/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn missing_container_is_not_found() {
        let uri = format!("/receiving/containers/{}", uuid::Uuid::now_v7());
        let (status, body) = send(&app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn unknown_part_is_rejected_before_registration() {
        let (status, body) = send(
            &app(),
            "POST",
            "/receiving/containers",
            Some(json!({ "container_no": "C-1", "lines": [{ "part_number": "Q7", "quantity": 3 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn receive_then_ship_moves_stock() {
        let app = app();

        let (status, container) = send(
            &app,
            "POST",
            "/receiving/containers",
            Some(json!({ "container_no": "C-1", "lines": [{ "part_number": "A1", "quantity": 20 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = container["id"].as_str().unwrap().to_string();

        let confirm = format!("/receiving/containers/{id}/confirm");
        let (status, body) = send(&app, "POST", &confirm, Some(json!({ "arrival_date": "2024-01-10" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert_eq!(body["document"]["status"], "COMPLETED");

        let (_, again) = send(&app, "POST", &confirm, Some(json!({ "arrival_date": "2024-01-10" }))).await;
        assert_eq!(again["changed"], false);

        let (status, sequence) = send(
            &app,
            "POST",
            "/shipments",
            Some(json!({
                "business_date": "2024-01-11",
                "label": { "kind": "run", "value": 1 },
                "lines": [{ "part_number": "A1", "quantity": 8 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let sid = sequence["id"].as_str().unwrap().to_string();

        let (status, shipped) = send(&app, "POST", &format!("/shipments/{sid}/confirm"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shipped["transactions"][0]["quantity"], -8);
        assert_eq!(shipped["transactions"][0]["balance_after"], 12);

        let (_, stock) = send(&app, "GET", "/stock/A1", None).await;
        assert_eq!(stock["current_stock"], 12);

        let (_, log) = send(&app, "GET", "/transactions?part=A1&type=OUTBOUND", None).await;
        assert_eq!(log.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn staged_count_edit_is_applied_on_completion() {
        let app = app();
        let (_, session) = send(&app, "POST", "/counts", Some(json!({ "count_date": "2024-01-12", "label": "monthly" }))).await;
        let id = session["id"].as_str().unwrap().to_string();

        let (status, session) = send(
            &app,
            "POST",
            &format!("/counts/{id}/items"),
            Some(json!({ "part_number": "A1", "physical_stock": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let item = session["items"][0]["item_id"].as_str().unwrap().to_string();

        let pending = format!("/counts/{id}/items/{item}/pending");
        let (status, view) = send(&app, "PUT", &pending, Some(json!({ "physical_stock": 3 }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(view["pending_edits"], 1);
        assert_eq!(view["items"][0]["physical_stock"], 3);

        let (status, done) = send(&app, "POST", &format!("/counts/{id}/complete"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["transactions"][0]["quantity"], 3);
        assert_eq!(done["transactions"][0]["type"], "PHYSICAL_INVENTORY");

        let (status, body) = send(&app, "PUT", &pending, Some(json!({ "physical_stock": 9 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invariant");
    }

    #[tokio::test]
    async fn adjustment_apply_and_reconcile() {
        let app = app();
        let (_, sheet) = send(&app, "GET", "/adjustments/sheet", None).await;
        assert_eq!(sheet.as_array().unwrap().len(), 1);

        let (_, report) = send(&app, "POST", "/adjustments/paste", Some(json!({ "text": "A1\t15\nZZ 3" }))).await;
        assert_eq!(report["accepted"].as_array().unwrap().len(), 1);
        assert_eq!(report["unmatched"].as_array().unwrap().len(), 1);

        let (status, applied) = send(
            &app,
            "POST",
            "/adjustments/apply",
            Some(json!({ "values": [{ "part_number": "A1", "new_value": 15 }], "date": "2024-01-13" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["transactions"][0]["quantity"], 15);

        let (status, run) = send(&app, "POST", "/admin/reconcile", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["report"]["divergences"].as_array().unwrap().len(), 0);

        let (status, relay) = send(&app, "POST", "/admin/outbox/relay", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(relay["delivered"], 1);
    }
}
