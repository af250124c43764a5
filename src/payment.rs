//! Payment ledger models
//!
//! A `PaymentRecord` is created in `Pending` state before the provider is
//! contacted and moves exactly once to `Successful` or `Failed` when the
//! provider's callback arrives. Terminal states are immutable.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Payment record status
///
/// Transitions: Pending -> Successful, Pending -> Failed. Nothing else.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Successful | PaymentStatus::Failed)
    }
}

/// Ledger entry for one repayment attempt
///
/// `transaction_id` is the idempotency token: it is generated at initiation,
/// handed to the provider as the correlation id, and echoed back in the
/// callback.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PaymentRecord {
    pub transaction_id: Uuid,
    pub loan_id: Uuid,
    /// Student identity key of the payer
    pub payer: String,
    pub payer_phone: String,
    pub amount: i64,
    pub status: PaymentStatus,
    /// Provider-side reference, set only on success
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to initiate a repayment collection
#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    pub loan_id: Uuid,

    #[validate(range(min = 1))]
    pub amount: i64,

    #[validate(length(min = 9, max = 15))]
    pub payer_phone: String,
}

/// Response for an accepted payment initiation
#[derive(Debug, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub transaction_id: Uuid,
    pub status: PaymentStatus,
}

/// Final status reported by the provider in its callback
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Successful,
    Failed,
}

/// Provider callback body
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub status: CallbackStatus,
    /// Provider-side transaction reference, present on success
    #[serde(default)]
    pub financial_transaction_id: Option<String>,
}

/// Acknowledgement returned to the provider
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackAck {
    pub acknowledged: bool,
}

/// Result of applying a callback to the ledger and loan in one atomic unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The record was Pending and has been settled as successful, with the
    /// balance decrement applied
    Applied {
        new_balance: i64,
        loan_paid: bool,
    },
    /// The record was Pending and has been marked failed; no balance change
    MarkedFailed,
    /// The record was already terminal; nothing was mutated
    AlreadyTerminal,
    /// No record exists for this correlation id
    NotFound,
}
