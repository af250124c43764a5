//! Postgres-backed store
//!
//! Settlement runs inside a single database transaction. The status change
//! is a conditional `UPDATE ... WHERE status = 'pending'`, so the idempotency
//! check and the write are one atomic statement rather than a read followed
//! by a separate write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{FundStore, StoreError};
use crate::loan::{ListLoansQuery, Loan, LoanStatus};
use crate::payment::{PaymentRecord, PaymentStatus, SettlementOutcome};

/// Store implementation over a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FundStore for PgStore {
    async fn create_loan(&self, loan: Loan) -> Result<Loan, StoreError> {
        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, borrower, purpose, principal_amount, outstanding_balance,
                status, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(&loan.borrower)
        .bind(&loan.purpose)
        .bind(loan.principal_amount)
        .bind(loan.outstanding_balance)
        .bind(loan.status)
        .bind(&loan.metadata)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>, StoreError> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn set_loan_status_if(
        &self,
        id: Uuid,
        expected: LoanStatus,
        new: LoanStatus,
    ) -> Result<Option<Loan>, StoreError> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .fetch_optional(&self.pool)
        .await?;

        Ok(loan)
    }

    async fn list_loans(&self, query: &ListLoansQuery) -> Result<Vec<Loan>, StoreError> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE ($1::text IS NULL OR borrower = $1)
              AND ($2::loan_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&query.borrower)
        .bind(query.status)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn insert_payment(&self, record: PaymentRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                transaction_id, loan_id, payer, payer_phone, amount,
                status, provider_reference, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.transaction_id)
        .bind(record.loan_id)
        .bind(&record.payer)
        .bind(&record.payer_phone)
        .bind(record.amount)
        .bind(record.status)
        .bind(&record.provider_reference)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateTransaction(record.transaction_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_payment(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            "SELECT * FROM payments WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_payments_for_loan(
        &self,
        loan_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let records = sqlx::query_as::<_, PaymentRecord>(
            "SELECT * FROM payments WHERE loan_id = $1 ORDER BY created_at ASC",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn settle_payment_success(
        &self,
        transaction_id: Uuid,
        provider_reference: &str,
    ) -> Result<SettlementOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Conditional update on the pending precondition. Zero rows means
        // the record is missing or already terminal.
        let claimed: Option<(Uuid, i64)> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'successful', provider_reference = $2, updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            RETURNING loan_id, amount
            "#,
        )
        .bind(transaction_id)
        .bind(provider_reference)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((loan_id, amount)) = claimed else {
            tx.rollback().await?;
            return self.classify_unclaimed(transaction_id).await;
        };

        let updated: Option<(i64, LoanStatus)> = sqlx::query_as(
            r#"
            UPDATE loans
            SET outstanding_balance = GREATEST(outstanding_balance - $2, 0),
                status = CASE
                    WHEN GREATEST(outstanding_balance - $2, 0) = 0 THEN 'paid'::loan_status
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING outstanding_balance, status
            "#,
        )
        .bind(loan_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((new_balance, loan_status)) = updated else {
            // A successful payment without a loan to decrement must never be
            // half-applied. Abort the whole transaction and alert.
            tx.rollback().await?;
            return Err(StoreError::Consistency(format!(
                "payment {} references missing loan {}",
                transaction_id, loan_id
            )));
        };

        tx.commit().await?;

        Ok(SettlementOutcome::Applied {
            new_balance,
            loan_paid: loan_status == LoanStatus::Paid,
        })
    }

    async fn settle_payment_failure(
        &self,
        transaction_id: Uuid,
    ) -> Result<SettlementOutcome, StoreError> {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'failed', updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            RETURNING loan_id
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(_) => Ok(SettlementOutcome::MarkedFailed),
            None => self.classify_unclaimed(transaction_id).await,
        }
    }

    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let records = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT * FROM payments
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

impl PgStore {
    /// Distinguish a replayed callback from an unknown correlation id after
    /// the conditional update matched nothing.
    async fn classify_unclaimed(
        &self,
        transaction_id: Uuid,
    ) -> Result<SettlementOutcome, StoreError> {
        let existing: Option<(PaymentStatus,)> =
            sqlx::query_as("SELECT status FROM payments WHERE transaction_id = $1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match existing {
            Some(_) => SettlementOutcome::AlreadyTerminal,
            None => SettlementOutcome::NotFound,
        })
    }
}
