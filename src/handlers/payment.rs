//! Payment API handlers
//!
//! The callback handler always acknowledges with 2xx for business-level
//! oddities (duplicates, unknown correlation ids, unparsable headers) so the
//! provider does not retry indefinitely. Only store failures surface as 5xx,
//! which is exactly the case where a provider retry is wanted.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::payment::{
    CallbackAck, CallbackRequest, InitiatePaymentRequest, InitiatePaymentResponse, PaymentRecord,
};

/// Header the provider echoes the correlation id in
pub const REFERENCE_ID_HEADER: &str = "x-reference-id";

/// Header carrying the shared callback secret, when configured
pub const CALLBACK_SECRET_HEADER: &str = "x-callback-secret";

/// Initiate a repayment collection
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<InitiatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<InitiatePaymentResponse>)> {
    let response = state
        .payment_service
        .initiate_payment(&user, request)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Provider webhook reporting a final payment status
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CallbackRequest>,
) -> ApiResult<Json<CallbackAck>> {
    if let Some(secret) = &state.callback_secret {
        let provided = headers
            .get(CALLBACK_SECRET_HEADER)
            .and_then(|h| h.to_str().ok());
        if provided != Some(secret.as_str()) {
            return Err(ApiError::Unauthorized(
                "invalid callback secret".to_string(),
            ));
        }
    }

    let correlation_id = headers
        .get(REFERENCE_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());

    let Some(correlation_id) = correlation_id else {
        // Not a callback we can correlate; acknowledge so the provider does
        // not retry, and leave a trail for investigation.
        tracing::warn!("Callback without a parsable X-Reference-Id acknowledged");
        return Ok(Json(CallbackAck { acknowledged: true }));
    };

    let ack = state
        .payment_service
        .process_callback(correlation_id, request)
        .await?;

    Ok(Json(ack))
}

/// Inspect a payment record
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<Json<PaymentRecord>> {
    let record = state
        .payment_service
        .get_payment(&user, transaction_id)
        .await?;
    Ok(Json(record))
}

/// Pending payments that never received a callback (admin only), for the
/// external reconciliation process
pub async fn list_stale_payments(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    let records = state.payment_service.stale_pending().await?;
    Ok(Json(records))
}
