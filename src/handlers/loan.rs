//! Loan API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::loan::{CreateLoanRequest, ListLoansQuery, Loan, ReviewLoanRequest};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::payment::PaymentRecord;

/// Submit a loan application
pub async fn apply_loan(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> ApiResult<(StatusCode, Json<Loan>)> {
    let loan = state.loan_service.apply(&user.subject, request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Approve or reject a pending application (admin only)
pub async fn review_loan(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<ReviewLoanRequest>,
) -> ApiResult<Json<Loan>> {
    let loan = state.loan_service.review(loan_id, request.decision).await?;
    Ok(Json(loan))
}

/// Fetch a single loan
pub async fn get_loan(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<Loan>> {
    let loan = state.loan_service.get_loan(&user, loan_id).await?;
    Ok(Json(loan))
}

/// List loans visible to the caller
pub async fn list_loans(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListLoansQuery>,
) -> ApiResult<Json<Vec<Loan>>> {
    let loans = state.loan_service.list_loans(&user, query).await?;
    Ok(Json(loans))
}

/// Payment history for a loan
pub async fn loan_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    let payments = state.loan_service.payment_history(&user, loan_id).await?;
    Ok(Json(payments))
}
