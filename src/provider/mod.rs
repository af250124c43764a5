//! Outbound mobile-money provider gateway
//!
//! The payment initiator talks to a `CollectionProvider` trait object so the
//! reconciliation core can be exercised against a scripted provider in tests.
//! `momo` holds the real reqwest-based gateway.

pub mod momo;

pub use momo::MomoGateway;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

/// Errors talking to the provider. All of them are synchronous-path errors;
/// the eventual payment outcome only ever arrives via callback.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("provider rejected the collection request: {0}")]
    Rejected(String),

    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::ProviderUnavailable(err.to_string())
    }
}

/// A request-to-pay collection submitted to the provider
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub amount: i64,
    pub currency: String,
    pub payer_phone: String,
    /// Correlation id the provider must echo back in its callback
    pub correlation_id: Uuid,
    /// Publicly reachable URL for the final-status callback
    pub callback_url: String,
}

/// Port for the provider's collection API
#[async_trait]
pub trait CollectionProvider: Send + Sync {
    /// Submit a collection request. `Ok(())` means the provider accepted and
    /// queued the request; it says nothing about eventual success.
    async fn request_collection(&self, request: &CollectionRequest) -> Result<(), ProviderError>;
}
