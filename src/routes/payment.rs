//! Payment route definitions

use axum::Router;

use crate::app_state::AppState;
use crate::handlers::*;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/payments/initiate",
            axum::routing::post(initiate_payment),
        )
        .route(
            "/api/payments/callback",
            axum::routing::post(payment_callback),
        )
        .route(
            "/api/payments/stale",
            axum::routing::get(list_stale_payments),
        )
        .route("/api/payments/:id", axum::routing::get(get_payment))
}
