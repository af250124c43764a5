//! MTN-MoMo-style collection gateway
//!
//! Token exchange is a basic-auth POST against the provider's token endpoint;
//! the bearer token is cached until shortly before expiry and refetched on
//! demand. Collection requests carry the correlation id in `X-Reference-Id`,
//! which the provider echoes back when it delivers the final status.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{CollectionProvider, CollectionRequest, ProviderError};
use crate::config::ProviderConfig;

/// Refresh the token this many seconds before the provider-reported expiry.
const TOKEN_EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Request-to-pay body in the provider's wire format
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestToPayBody {
    amount: String,
    currency: String,
    external_id: String,
    payer: PayerParty,
    payer_message: String,
    payee_note: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayerParty {
    party_id_type: &'static str,
    party_id: String,
}

/// Reqwest-based gateway for the mobile-money collection API
pub struct MomoGateway {
    http: reqwest::Client,
    config: ProviderConfig,
    token: Mutex<Option<CachedToken>>,
}

impl MomoGateway {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, exchanging credentials when the cached
    /// one is missing or about to expire.
    async fn authenticate(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/collection/token/", self.config.base_url))
            .basic_auth(&self.config.api_user, Some(&self.config.api_key))
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::AuthFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response.json().await?;
        let ttl = (body.expires_in - TOKEN_EXPIRY_LEEWAY_SECS).max(0);
        let cached = CachedToken {
            access_token: body.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(ttl),
        };
        *guard = Some(cached);

        tracing::debug!(ttl_secs = ttl, "Provider access token refreshed");

        Ok(body.access_token)
    }
}

#[async_trait]
impl CollectionProvider for MomoGateway {
    async fn request_collection(&self, request: &CollectionRequest) -> Result<(), ProviderError> {
        let token = self.authenticate().await?;

        let body = RequestToPayBody {
            amount: request.amount.to_string(),
            currency: request.currency.clone(),
            external_id: request.correlation_id.to_string(),
            payer: PayerParty {
                party_id_type: "MSISDN",
                party_id: request.payer_phone.clone(),
            },
            payer_message: "Alumni fund loan repayment".to_string(),
            payee_note: "Loan repayment collection".to_string(),
        };

        let response = self
            .http
            .post(format!(
                "{}/collection/v1_0/requesttopay",
                self.config.base_url
            ))
            .bearer_auth(token)
            .header("X-Reference-Id", request.correlation_id.to_string())
            .header("X-Target-Environment", &self.config.target_environment)
            .header("X-Callback-Url", &request.callback_url)
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Drop the cached token so the next attempt re-authenticates.
            self.token.lock().await.take();
            return Err(ProviderError::AuthFailed(
                "collection request rejected with 401".to_string(),
            ));
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{}: {}", status, detail)));
        }

        tracing::info!(
            correlation_id = %request.correlation_id,
            amount = request.amount,
            "Collection request accepted by provider"
        );

        Ok(())
    }
}
