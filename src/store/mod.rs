//! Persistence ports for the loan ledger
//!
//! The services talk to a `FundStore` trait object so the settlement core can
//! run against Postgres in production and an in-memory backend in tests. The
//! two settlement operations are the only place loan balances are mutated,
//! and each backend must apply them atomically: the payment status
//! compare-and-set and the balance decrement happen together or not at all.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::loan::{ListLoansQuery, Loan, LoanStatus};
use crate::payment::{PaymentRecord, SettlementOutcome};

/// Store-level errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate transaction id: {0}")]
    DuplicateTransaction(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ledger consistency violation: {0}")]
    Consistency(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateTransaction(id) => {
                ApiError::Conflict(format!("transaction {} already exists", id))
            }
            StoreError::Database(e) => ApiError::DatabaseError(e.to_string()),
            StoreError::Consistency(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Persistence operations for loans and the payment ledger
#[async_trait]
pub trait FundStore: Send + Sync {
    /// Insert a new loan account
    async fn create_loan(&self, loan: Loan) -> Result<Loan, StoreError>;

    /// Fetch a loan by id
    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>, StoreError>;

    /// Compare-and-set a loan's status. Returns the updated loan, or `None`
    /// when the loan is missing or its status is not `expected`.
    async fn set_loan_status_if(
        &self,
        id: Uuid,
        expected: LoanStatus,
        new: LoanStatus,
    ) -> Result<Option<Loan>, StoreError>;

    /// List loans, optionally filtered by borrower and status
    async fn list_loans(&self, query: &ListLoansQuery) -> Result<Vec<Loan>, StoreError>;

    /// Append a payment record to the ledger. The transaction id is unique;
    /// a second insert with the same id fails with `DuplicateTransaction`.
    async fn insert_payment(&self, record: PaymentRecord) -> Result<(), StoreError>;

    /// Fetch a payment record by its transaction id
    async fn get_payment(&self, transaction_id: Uuid)
        -> Result<Option<PaymentRecord>, StoreError>;

    /// Payment history for one loan, oldest first
    async fn list_payments_for_loan(
        &self,
        loan_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, StoreError>;

    /// Settle a successful payment: atomically move the record from Pending
    /// to Successful (storing the provider reference) and decrement the
    /// loan's outstanding balance, clamped at zero. A loan whose balance
    /// reaches zero becomes `Paid`.
    async fn settle_payment_success(
        &self,
        transaction_id: Uuid,
        provider_reference: &str,
    ) -> Result<SettlementOutcome, StoreError>;

    /// Settle a failed payment: move the record from Pending to Failed.
    /// No balance mutation.
    async fn settle_payment_failure(
        &self,
        transaction_id: Uuid,
    ) -> Result<SettlementOutcome, StoreError>;

    /// Pending records created before `older_than`, for the external
    /// reconciliation process. Stale pendings are never auto-expired here.
    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, StoreError>;
}
