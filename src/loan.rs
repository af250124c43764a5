//! Loan account models
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Loan lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Active,
    Paid,
}

impl LoanStatus {
    /// Whether a repayment may be initiated against a loan in this state
    pub fn is_repayable(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Active)
    }
}

/// Typed metadata attached to a loan application
///
/// Known keys are explicit fields; anything else the client sends is kept in
/// the residual map so older records survive schema evolution.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LoanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub programme: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<i32>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Loan account model
///
/// `outstanding_balance` is a materialized aggregate: it always equals
/// `principal_amount` minus the sum of successful payments, clamped at zero.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    /// Student identity key of the borrower
    pub borrower: String,
    pub purpose: String,
    pub principal_amount: i64,
    pub outstanding_balance: i64,
    pub status: LoanStatus,
    pub metadata: sqlx::types::Json<LoanMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to apply for a new loan
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    #[validate(length(min = 1, max = 500))]
    pub purpose: String,

    #[validate(range(min = 1))]
    pub principal_amount: i64,

    #[serde(default)]
    pub metadata: LoanMetadata,
}

/// Administrative decision on a pending loan application
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Request body for reviewing a loan application
#[derive(Debug, Deserialize)]
pub struct ReviewLoanRequest {
    pub decision: ReviewDecision,
}

/// Query for listing loans
#[derive(Debug, Deserialize, Default)]
pub struct ListLoansQuery {
    pub borrower: Option<String>,
    pub status: Option<LoanStatus>,
}
