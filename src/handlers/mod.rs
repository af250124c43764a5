//! API handlers

mod loan;
mod payment;

pub use loan::{apply_loan, get_loan, list_loans, loan_payments, review_loan};
pub use payment::{
    get_payment, initiate_payment, list_stale_payments, payment_callback,
    CALLBACK_SECRET_HEADER, REFERENCE_ID_HEADER,
};
