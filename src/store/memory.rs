//! In-memory store backend
//!
//! Used by the integration tests and local development. A single mutex over
//! both maps makes every settlement a serializable critical section, matching
//! the transactional guarantees of the Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{FundStore, StoreError};
use crate::loan::{ListLoansQuery, Loan, LoanStatus};
use crate::payment::{PaymentRecord, PaymentStatus, SettlementOutcome};

#[derive(Default)]
struct Inner {
    loans: HashMap<Uuid, Loan>,
    payments: HashMap<Uuid, PaymentRecord>,
}

/// In-memory store holding loans and the payment ledger behind one mutex
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FundStore for MemoryStore {
    async fn create_loan(&self, loan: Loan) -> Result<Loan, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.loans.get(&id).cloned())
    }

    async fn set_loan_status_if(
        &self,
        id: Uuid,
        expected: LoanStatus,
        new: LoanStatus,
    ) -> Result<Option<Loan>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.loans.get_mut(&id) {
            Some(loan) if loan.status == expected => {
                loan.status = new;
                loan.updated_at = Utc::now();
                Ok(Some(loan.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_loans(&self, query: &ListLoansQuery) -> Result<Vec<Loan>, StoreError> {
        let inner = self.inner.lock().await;
        let mut loans: Vec<Loan> = inner
            .loans
            .values()
            .filter(|l| {
                query
                    .borrower
                    .as_ref()
                    .map(|b| &l.borrower == b)
                    .unwrap_or(true)
                    && query.status.map(|s| l.status == s).unwrap_or(true)
            })
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loans)
    }

    async fn insert_payment(&self, record: PaymentRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.payments.contains_key(&record.transaction_id) {
            return Err(StoreError::DuplicateTransaction(record.transaction_id));
        }
        inner.payments.insert(record.transaction_id, record);
        Ok(())
    }

    async fn get_payment(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.get(&transaction_id).cloned())
    }

    async fn list_payments_for_loan(
        &self,
        loan_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<PaymentRecord> = inner
            .payments
            .values()
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn settle_payment_success(
        &self,
        transaction_id: Uuid,
        provider_reference: &str,
    ) -> Result<SettlementOutcome, StoreError> {
        // Both writes happen under the same lock acquisition.
        let mut inner = self.inner.lock().await;

        let (loan_id, amount) = match inner.payments.get_mut(&transaction_id) {
            None => return Ok(SettlementOutcome::NotFound),
            Some(record) if record.status.is_terminal() => {
                return Ok(SettlementOutcome::AlreadyTerminal)
            }
            Some(record) => {
                record.status = PaymentStatus::Successful;
                record.provider_reference = Some(provider_reference.to_string());
                record.updated_at = Utc::now();
                (record.loan_id, record.amount)
            }
        };

        let Some(loan) = inner.loans.get_mut(&loan_id) else {
            return Err(StoreError::Consistency(format!(
                "payment {} references missing loan {}",
                transaction_id, loan_id
            )));
        };

        loan.outstanding_balance = (loan.outstanding_balance - amount).max(0);
        if loan.outstanding_balance == 0 {
            loan.status = LoanStatus::Paid;
        }
        loan.updated_at = Utc::now();

        Ok(SettlementOutcome::Applied {
            new_balance: loan.outstanding_balance,
            loan_paid: loan.status == LoanStatus::Paid,
        })
    }

    async fn settle_payment_failure(
        &self,
        transaction_id: Uuid,
    ) -> Result<SettlementOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        match inner.payments.get_mut(&transaction_id) {
            None => Ok(SettlementOutcome::NotFound),
            Some(record) if record.status.is_terminal() => Ok(SettlementOutcome::AlreadyTerminal),
            Some(record) => {
                record.status = PaymentStatus::Failed;
                record.updated_at = Utc::now();
                Ok(SettlementOutcome::MarkedFailed)
            }
        }
    }

    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<PaymentRecord> = inner
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.created_at < older_than)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::LoanMetadata;

    fn loan(principal: i64) -> Loan {
        let now = Utc::now();
        Loan {
            id: Uuid::new_v4(),
            borrower: "student-1".to_string(),
            purpose: "tuition".to_string(),
            principal_amount: principal,
            outstanding_balance: principal,
            status: LoanStatus::Active,
            metadata: sqlx::types::Json(LoanMetadata::default()),
            created_at: now,
            updated_at: now,
        }
    }

    fn pending_payment(loan_id: Uuid, amount: i64) -> PaymentRecord {
        let now = Utc::now();
        PaymentRecord {
            transaction_id: Uuid::new_v4(),
            loan_id,
            payer: "student-1".to_string(),
            payer_phone: "256772000001".to_string(),
            amount,
            status: PaymentStatus::Pending,
            provider_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_settle_success_decrements_once() {
        let store = MemoryStore::new();
        let loan = store.create_loan(loan(500_000)).await.unwrap();
        let payment = pending_payment(loan.id, 200_000);
        let tx_id = payment.transaction_id;
        store.insert_payment(payment).await.unwrap();

        let outcome = store.settle_payment_success(tx_id, "MM-1").await.unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::Applied {
                new_balance: 300_000,
                loan_paid: false
            }
        );

        // Replay is a no-op
        let replay = store.settle_payment_success(tx_id, "MM-1").await.unwrap();
        assert_eq!(replay, SettlementOutcome::AlreadyTerminal);
        let loan = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(loan.outstanding_balance, 300_000);
    }

    #[tokio::test]
    async fn test_balance_clamps_at_zero_and_loan_marked_paid() {
        let store = MemoryStore::new();
        let loan = store.create_loan(loan(100_000)).await.unwrap();
        let payment = pending_payment(loan.id, 150_000);
        let tx_id = payment.transaction_id;
        store.insert_payment(payment).await.unwrap();

        let outcome = store.settle_payment_success(tx_id, "MM-2").await.unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::Applied {
                new_balance: 0,
                loan_paid: true
            }
        );

        let loan = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(loan.outstanding_balance, 0);
        assert_eq!(loan.status, LoanStatus::Paid);
    }

    #[tokio::test]
    async fn test_duplicate_transaction_id_rejected() {
        let store = MemoryStore::new();
        let loan = store.create_loan(loan(100_000)).await.unwrap();
        let payment = pending_payment(loan.id, 10_000);
        store.insert_payment(payment.clone()).await.unwrap();

        let err = store.insert_payment(payment).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTransaction(_)));
    }

    #[tokio::test]
    async fn test_stale_pending_listing() {
        let store = MemoryStore::new();
        let loan = store.create_loan(loan(100_000)).await.unwrap();
        let mut payment = pending_payment(loan.id, 10_000);
        payment.created_at = Utc::now() - chrono::Duration::hours(48);
        let tx_id = payment.transaction_id;
        store.insert_payment(payment).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let stale = store.list_stale_pending(cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].transaction_id, tx_id);
    }
}
