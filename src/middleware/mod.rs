//! Middleware for the alumni fund API
//!
//! Request tracing and bearer-token authentication.

pub mod auth;
mod tracing;

pub use auth::{issue_token, AdminUser, AuthenticatedUser, JwtVerifier, UserRole};
pub use tracing::request_tracing;
