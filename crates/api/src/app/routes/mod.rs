use axum::{routing::get, Router};

pub mod adjustments;
pub mod admin;
pub mod counts;
pub mod receiving;
pub mod shipments;
pub mod stock;
pub mod system;

/// Router for every ledger endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/stock", get(stock::list_stock))
        .route("/stock/:part", get(stock::get_stock))
        .route("/transactions", get(stock::list_transactions))
        .nest("/receiving", receiving::router())
        .nest("/shipments", shipments::router())
        .nest("/counts", counts::router())
        .nest("/adjustments", adjustments::router())
        .nest("/admin", admin::router())
}
