//! Loan route definitions

use axum::Router;

use crate::app_state::AppState;
use crate::handlers::*;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", axum::routing::post(apply_loan))
        .route("/api/loans", axum::routing::get(list_loans))
        .route("/api/loans/:id", axum::routing::get(get_loan))
        .route("/api/loans/:id/review", axum::routing::post(review_loan))
        .route("/api/loans/:id/payments", axum::routing::get(loan_payments))
}
