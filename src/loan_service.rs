//! Loan service layer - application and review lifecycle
//!
//! Balance mutations never happen here; the callback processor in
//! `payment_service` is the sole writer of loan balances.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::loan::{CreateLoanRequest, ListLoansQuery, Loan, LoanStatus, ReviewDecision};
use crate::middleware::AuthenticatedUser;
use crate::payment::PaymentRecord;
use crate::store::FundStore;

/// Loan service for managing the loan lifecycle
pub struct LoanService {
    store: Arc<dyn FundStore>,
}

impl LoanService {
    pub fn new(store: Arc<dyn FundStore>) -> Self {
        Self { store }
    }

    /// Submit a loan application. The account starts pending with the
    /// outstanding balance equal to the principal.
    pub async fn apply(&self, borrower: &str, request: CreateLoanRequest) -> ApiResult<Loan> {
        request.validate()?;

        let now = Utc::now();
        let loan = Loan {
            id: Uuid::new_v4(),
            borrower: borrower.to_string(),
            purpose: request.purpose,
            principal_amount: request.principal_amount,
            outstanding_balance: request.principal_amount,
            status: LoanStatus::Pending,
            metadata: sqlx::types::Json(request.metadata),
            created_at: now,
            updated_at: now,
        };

        let created = self.store.create_loan(loan).await?;

        tracing::info!(
            loan_id = %created.id,
            borrower = %created.borrower,
            principal = created.principal_amount,
            "Loan application created"
        );

        Ok(created)
    }

    /// Administrative approve/reject of a pending application. The status
    /// change is a compare-and-set on the pending precondition.
    pub async fn review(&self, loan_id: Uuid, decision: ReviewDecision) -> ApiResult<Loan> {
        let new_status = match decision {
            ReviewDecision::Approve => LoanStatus::Approved,
            ReviewDecision::Reject => LoanStatus::Rejected,
        };

        let updated = self
            .store
            .set_loan_status_if(loan_id, LoanStatus::Pending, new_status)
            .await?;

        match updated {
            Some(loan) => {
                tracing::info!(loan_id = %loan.id, status = ?loan.status, "Loan reviewed");
                Ok(loan)
            }
            None => match self.store.get_loan(loan_id).await? {
                Some(loan) => Err(ApiError::Conflict(format!(
                    "loan {} is not pending review (status: {:?})",
                    loan_id, loan.status
                ))),
                None => Err(ApiError::NotFound(format!("loan {} not found", loan_id))),
            },
        }
    }

    /// Fetch a loan, enforcing that only the borrower or an admin may see it
    pub async fn get_loan(&self, caller: &AuthenticatedUser, loan_id: Uuid) -> ApiResult<Loan> {
        let loan = self
            .store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("loan {} not found", loan_id)))?;

        if !caller.is_admin() && loan.borrower != caller.subject {
            return Err(ApiError::Forbidden(
                "not authorized to view this loan".to_string(),
            ));
        }

        Ok(loan)
    }

    /// List loans. Students see only their own; admins may filter freely.
    pub async fn list_loans(
        &self,
        caller: &AuthenticatedUser,
        mut query: ListLoansQuery,
    ) -> ApiResult<Vec<Loan>> {
        if !caller.is_admin() {
            query.borrower = Some(caller.subject.clone());
        }
        Ok(self.store.list_loans(&query).await?)
    }

    /// Payment history for a loan, oldest first
    pub async fn payment_history(
        &self,
        caller: &AuthenticatedUser,
        loan_id: Uuid,
    ) -> ApiResult<Vec<PaymentRecord>> {
        // Reuses the ownership check
        let loan = self.get_loan(caller, loan_id).await?;
        Ok(self.store.list_payments_for_loan(loan.id).await?)
    }
}
