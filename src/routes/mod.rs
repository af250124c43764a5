//! Route definitions for the alumni fund API

mod loan;
mod payment;

pub use loan::loan_routes;
pub use payment::payment_routes;

use axum::{routing::get, Router};

use crate::app_state::AppState;
use crate::middleware;

async fn root() -> &'static str {
    "Alumni Fund API Server"
}

/// Build the application router over the shared state
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(loan_routes())
        .merge(payment_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
