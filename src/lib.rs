//! Alumni Fund Backend Library
//!
//! Exports the core modules for the alumni fund loan and repayment server.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod loan_service;
pub mod middleware;
pub mod payment;
pub mod payment_service;
pub mod provider;
pub mod routes;
pub mod store;
