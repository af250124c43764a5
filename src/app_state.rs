//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::loan_service::LoanService;
use crate::middleware::JwtVerifier;
use crate::payment_service::PaymentService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub payment_service: Arc<PaymentService>,
    pub verifier: JwtVerifier,
    /// Shared secret expected on provider callbacks, if configured
    pub callback_secret: Option<String>,
}

impl AppState {
    pub fn new(
        loan_service: Arc<LoanService>,
        payment_service: Arc<PaymentService>,
        verifier: JwtVerifier,
        callback_secret: Option<String>,
    ) -> Self {
        Self {
            loan_service,
            payment_service,
            verifier,
            callback_secret,
        }
    }
}

impl FromRef<AppState> for JwtVerifier {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.verifier.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}
