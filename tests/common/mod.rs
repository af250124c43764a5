//! Shared test harness: services over the in-memory store with a scripted
//! provider standing in for the mobile-money gateway.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use alumnifund_server::config::{Config, Environment, ProviderConfig};
use alumnifund_server::loan::{CreateLoanRequest, LoanMetadata, ReviewDecision};
use alumnifund_server::loan_service::LoanService;
use alumnifund_server::middleware::{AuthenticatedUser, UserRole};
use alumnifund_server::payment::InitiatePaymentRequest;
use alumnifund_server::payment_service::PaymentService;
use alumnifund_server::provider::{CollectionProvider, CollectionRequest, ProviderError};
use alumnifund_server::store::MemoryStore;

pub const JWT_SECRET: &str = "test-secret";

/// Provider double: accepts or rejects every collection request
pub struct ScriptedProvider {
    fail: bool,
    pub calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn accepting() -> Self {
        Self {
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CollectionProvider for ScriptedProvider {
    async fn request_collection(&self, _request: &CollectionRequest) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ProviderError::Rejected("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn test_config(callback_secret: Option<String>) -> Config {
    Config {
        database_url: "postgresql://localhost/unused".to_string(),
        environment: Environment::Development,
        port: 0,
        db_max_connections: 1,
        callback_secret,
        cors_allowed_origins: None,
        log_level: "info".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        stale_pending_hours: 24,
        provider: ProviderConfig {
            base_url: "http://localhost:0".to_string(),
            subscription_key: "k".to_string(),
            api_user: "u".to_string(),
            api_key: "p".to_string(),
            target_environment: "sandbox".to_string(),
            currency: "UGX".to_string(),
            callback_url: "https://example.org/api/payments/callback".to_string(),
        },
    }
}

pub fn student(subject: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        subject: subject.to_string(),
        role: UserRole::Student,
    }
}

pub fn admin() -> AuthenticatedUser {
    AuthenticatedUser {
        subject: "registrar".to_string(),
        role: UserRole::Admin,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub loans: Arc<LoanService>,
    pub payments: Arc<PaymentService>,
}

pub fn harness(provider: ScriptedProvider) -> Harness {
    harness_with_config(provider, test_config(None))
}

pub fn harness_with_config(provider: ScriptedProvider, config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let loans = Arc::new(LoanService::new(store.clone()));
    let payments = Arc::new(PaymentService::new(
        store.clone(),
        Arc::new(provider),
        &config,
    ));
    Harness {
        store,
        loans,
        payments,
    }
}

/// Apply and approve a loan, returning its id
pub async fn approved_loan(h: &Harness, borrower: &str, principal: i64) -> Uuid {
    let loan = h
        .loans
        .apply(
            borrower,
            CreateLoanRequest {
                purpose: "Final year tuition".to_string(),
                principal_amount: principal,
                metadata: LoanMetadata::default(),
            },
        )
        .await
        .expect("loan application should succeed");
    h.loans
        .review(loan.id, ReviewDecision::Approve)
        .await
        .expect("loan approval should succeed");
    loan.id
}

/// Initiate a payment and return its transaction id
pub async fn initiated_payment(h: &Harness, borrower: &str, loan_id: Uuid, amount: i64) -> Uuid {
    h.payments
        .initiate_payment(
            &student(borrower),
            InitiatePaymentRequest {
                loan_id,
                amount,
                payer_phone: "256772000001".to_string(),
            },
        )
        .await
        .expect("payment initiation should succeed")
        .transaction_id
}
