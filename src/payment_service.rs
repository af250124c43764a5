//! Payment service - collection initiation and callback reconciliation
//!
//! This is the highest-stakes code in the service. Two rules hold it
//! together:
//!
//! 1. A `PaymentRecord` is persisted in `Pending` state *before* the provider
//!    is contacted, so every outbound request has a traceable ledger entry
//!    even if the network call fails mid-flight.
//! 2. The callback processor is the sole writer of loan balances, and every
//!    status transition goes through the store's atomic settle operations,
//!    which compare-and-set on the pending precondition. Replayed or
//!    duplicated callbacks are acknowledged without touching anything.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::payment::{
    CallbackAck, CallbackRequest, CallbackStatus, InitiatePaymentRequest, InitiatePaymentResponse,
    PaymentRecord, PaymentStatus, SettlementOutcome,
};
use crate::provider::{CollectionProvider, CollectionRequest};
use crate::store::FundStore;

/// Payment service owning initiation and callback processing
pub struct PaymentService {
    store: Arc<dyn FundStore>,
    provider: Arc<dyn CollectionProvider>,
    currency: String,
    callback_url: String,
    stale_pending_hours: i64,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn FundStore>,
        provider: Arc<dyn CollectionProvider>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            provider,
            currency: config.provider.currency.clone(),
            callback_url: config.provider.callback_url.clone(),
            stale_pending_hours: config.stale_pending_hours,
        }
    }

    /// Initiate a repayment collection against the provider.
    ///
    /// The pending ledger entry is written first; a synchronous provider
    /// failure leaves it in place for later reconciliation, since the real
    /// payment may have been accepted upstream despite the error we saw.
    pub async fn initiate_payment(
        &self,
        caller: &AuthenticatedUser,
        request: InitiatePaymentRequest,
    ) -> ApiResult<InitiatePaymentResponse> {
        request.validate()?;

        let loan = self
            .store
            .get_loan(request.loan_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("loan {} not found", request.loan_id)))?;

        if !caller.is_admin() && loan.borrower != caller.subject {
            return Err(ApiError::Forbidden(
                "not authorized to pay toward this loan".to_string(),
            ));
        }

        if !loan.status.is_repayable() {
            return Err(ApiError::Conflict(format!(
                "loan {} is not open for repayment (status: {:?})",
                loan.id, loan.status
            )));
        }

        let transaction_id = Uuid::new_v4();
        let now = Utc::now();
        let record = PaymentRecord {
            transaction_id,
            loan_id: loan.id,
            payer: caller.subject.clone(),
            payer_phone: request.payer_phone.clone(),
            amount: request.amount,
            status: PaymentStatus::Pending,
            provider_reference: None,
            created_at: now,
            updated_at: now,
        };

        // Durability first: the ledger entry must exist before any bytes go
        // out to the provider.
        self.store.insert_payment(record).await?;

        tracing::info!(
            transaction_id = %transaction_id,
            loan_id = %loan.id,
            amount = request.amount,
            "Payment record created, submitting collection request"
        );

        let collection = CollectionRequest {
            amount: request.amount,
            currency: self.currency.clone(),
            payer_phone: request.payer_phone,
            correlation_id: transaction_id,
            callback_url: self.callback_url.clone(),
        };

        if let Err(e) = self.provider.request_collection(&collection).await {
            // Not rolled back: the provider may have accepted the request
            // despite the error we saw. The record stays pending until the
            // callback or the reconciliation process resolves it.
            tracing::warn!(
                transaction_id = %transaction_id,
                error = %e,
                "Provider call failed; pending record kept for reconciliation"
            );
            return Err(e.into());
        }

        Ok(InitiatePaymentResponse {
            transaction_id,
            status: PaymentStatus::Pending,
        })
    }

    /// Process a provider callback reporting the final payment status.
    ///
    /// Always acknowledges unless the store itself errors; duplicates and
    /// unknown correlation ids are logged, never surfaced as failures the
    /// provider would retry indefinitely.
    pub async fn process_callback(
        &self,
        correlation_id: Uuid,
        request: CallbackRequest,
    ) -> ApiResult<CallbackAck> {
        let outcome = match request.status {
            CallbackStatus::Successful => {
                let reference = request.financial_transaction_id.as_deref().unwrap_or("");
                if reference.is_empty() {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        "Successful callback without a provider reference"
                    );
                }
                self.store
                    .settle_payment_success(correlation_id, reference)
                    .await?
            }
            CallbackStatus::Failed => {
                self.store.settle_payment_failure(correlation_id).await?
            }
        };

        match outcome {
            SettlementOutcome::Applied {
                new_balance,
                loan_paid,
            } => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    new_balance,
                    loan_paid,
                    "Payment settled successfully"
                );
            }
            SettlementOutcome::MarkedFailed => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    "Payment marked failed; no balance change"
                );
            }
            SettlementOutcome::AlreadyTerminal => {
                // Duplicate delivery is documented provider behavior.
                tracing::info!(
                    correlation_id = %correlation_id,
                    "Duplicate callback ignored"
                );
            }
            SettlementOutcome::NotFound => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    "Callback for unknown correlation id acknowledged"
                );
            }
        }

        Ok(CallbackAck { acknowledged: true })
    }

    /// Fetch a payment record; only the payer or an admin may see it
    pub async fn get_payment(
        &self,
        caller: &AuthenticatedUser,
        transaction_id: Uuid,
    ) -> ApiResult<PaymentRecord> {
        let record = self
            .store
            .get_payment(transaction_id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("payment {} not found", transaction_id))
            })?;

        if !caller.is_admin() && record.payer != caller.subject {
            return Err(ApiError::Forbidden(
                "not authorized to view this payment".to_string(),
            ));
        }

        Ok(record)
    }

    /// Pending records older than the configured window, for the external
    /// reconciliation process. They are never auto-expired here.
    pub async fn stale_pending(&self) -> ApiResult<Vec<PaymentRecord>> {
        let cutoff = Utc::now() - Duration::hours(self.stale_pending_hours);
        Ok(self.store.list_stale_pending(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, ProviderConfig};
    use crate::loan::{CreateLoanRequest, LoanMetadata, LoanStatus, ReviewDecision};
    use crate::loan_service::LoanService;
    use crate::middleware::UserRole;
    use crate::provider::ProviderError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider double that records calls and can be scripted to fail
    struct ScriptedProvider {
        fail: bool,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn accepting() -> Self {
            Self {
                fail: false,
                calls: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CollectionProvider for ScriptedProvider {
        async fn request_collection(
            &self,
            _request: &CollectionRequest,
        ) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProviderError::Rejected("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgresql://localhost/unused".to_string(),
            environment: Environment::Development,
            port: 0,
            db_max_connections: 1,
            callback_secret: None,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            jwt_secret: "test-secret".to_string(),
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

    fn student(subject: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            subject: subject.to_string(),
            role: UserRole::Student,
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        loans: LoanService,
        payments: PaymentService,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let loans = LoanService::new(store.clone());
        let payments = PaymentService::new(store.clone(), Arc::new(provider), &test_config());
        Harness {
            store,
            loans,
            payments,
        }
    }

    async fn active_loan(h: &Harness, borrower: &str, principal: i64) -> Uuid {
        let loan = h
            .loans
            .apply(
                borrower,
                CreateLoanRequest {
                    purpose: "tuition".to_string(),
                    principal_amount: principal,
                    metadata: LoanMetadata::default(),
                },
            )
            .await
            .unwrap();
        h.loans
            .review(loan.id, ReviewDecision::Approve)
            .await
            .unwrap();
        loan.id
    }

    #[tokio::test]
    async fn test_initiate_creates_pending_record_before_provider_call() {
        let h = harness(ScriptedProvider::accepting());
        let loan_id = active_loan(&h, "student-1", 500_000).await;

        let response = h
            .payments
            .initiate_payment(
                &student("student-1"),
                InitiatePaymentRequest {
                    loan_id,
                    amount: 200_000,
                    payer_phone: "256772000001".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.status, PaymentStatus::Pending);

        let record = h
            .store
            .get_payment(response.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.loan_id, loan_id);
        assert_eq!(record.amount, 200_000);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_pending_record() {
        let h = harness(ScriptedProvider::failing());
        let loan_id = active_loan(&h, "student-1", 500_000).await;

        let err = h
            .payments
            .initiate_payment(
                &student("student-1"),
                InitiatePaymentRequest {
                    loan_id,
                    amount: 200_000,
                    payer_phone: "256772000001".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProviderUnavailable(_)));

        // The pending record survives for reconciliation
        let history = h.store.list_payments_for_loan(loan_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_non_owner_cannot_initiate() {
        let h = harness(ScriptedProvider::accepting());
        let loan_id = active_loan(&h, "student-1", 500_000).await;

        let err = h
            .payments
            .initiate_payment(
                &student("student-2"),
                InitiatePaymentRequest {
                    loan_id,
                    amount: 200_000,
                    payer_phone: "256772000001".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // Authorization failures never reach the ledger
        assert!(h
            .store
            .list_payments_for_loan(loan_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unapproved_loan_rejects_initiation() {
        let h = harness(ScriptedProvider::accepting());
        let loan = h
            .loans
            .apply(
                "student-1",
                CreateLoanRequest {
                    purpose: "tuition".to_string(),
                    principal_amount: 100_000,
                    metadata: LoanMetadata::default(),
                },
            )
            .await
            .unwrap();

        let err = h
            .payments
            .initiate_payment(
                &student("student-1"),
                InitiatePaymentRequest {
                    loan_id: loan.id,
                    amount: 50_000,
                    payer_phone: "256772000001".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_callback_success_then_loan_paid() {
        let h = harness(ScriptedProvider::accepting());
        let loan_id = active_loan(&h, "student-1", 200_000).await;

        let response = h
            .payments
            .initiate_payment(
                &student("student-1"),
                InitiatePaymentRequest {
                    loan_id,
                    amount: 200_000,
                    payer_phone: "256772000001".to_string(),
                },
            )
            .await
            .unwrap();

        let ack = h
            .payments
            .process_callback(
                response.transaction_id,
                CallbackRequest {
                    status: CallbackStatus::Successful,
                    financial_transaction_id: Some("MM-100".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(ack.acknowledged);

        let loan = h.store.get_loan(loan_id).await.unwrap().unwrap();
        assert_eq!(loan.outstanding_balance, 0);
        assert_eq!(loan.status, LoanStatus::Paid);

        let record = h
            .store
            .get_payment(response.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Successful);
        assert_eq!(record.provider_reference.as_deref(), Some("MM-100"));
    }

    #[tokio::test]
    async fn test_unknown_correlation_id_is_acknowledged() {
        let h = harness(ScriptedProvider::accepting());

        let ack = h
            .payments
            .process_callback(
                Uuid::new_v4(),
                CallbackRequest {
                    status: CallbackStatus::Successful,
                    financial_transaction_id: Some("MM-404".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(ack.acknowledged);
    }
}
