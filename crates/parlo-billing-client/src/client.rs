//! Parlo-billing HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use parlo_billing_core::Credits;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, BalanceResponse, CheckBalanceRequest, CheckBalanceResponse, TransportEvent,
    TransportEventRequest, TransportEventResponse,
};

/// Parlo-billing API client.
///
/// Provides methods for gating call setup on balances and reporting
/// transport lifecycle events.
#[derive(Debug, Clone)]
pub struct BillingClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl BillingClient {
    /// Create a new billing client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the billing service (e.g., `"http://parlo-billing:8080"`)
    /// * `api_key` - Service API key for authentication
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new billing client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    /// Check whether an account can cover a charge.
    ///
    /// The transport tier calls this before reserving media resources for a
    /// new call.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn check_balance(
        &self,
        account_id: impl Into<String>,
        required: Credits,
    ) -> Result<CheckBalanceResponse, ClientError> {
        let url = format!("{}/v1/credits/check", self.base_url);
        let request = CheckBalanceRequest {
            account_id: account_id.into(),
            required,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report that an account's media connection was established.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn transport_connected(
        &self,
        account_id: impl Into<String>,
    ) -> Result<TransportEventResponse, ClientError> {
        self.send_transport_event(account_id.into(), TransportEvent::Connected)
            .await
    }

    /// Report that an account's media connection dropped.
    ///
    /// If a session was still being metered, the response carries its final
    /// usage.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn transport_disconnected(
        &self,
        account_id: impl Into<String>,
    ) -> Result<TransportEventResponse, ClientError> {
        self.send_transport_event(account_id.into(), TransportEvent::Disconnected)
            .await
    }

    async fn send_transport_event(
        &self,
        account_id: String,
        event: TransportEvent,
    ) -> Result<TransportEventResponse, ClientError> {
        let url = format!("{}/v1/transport/events", self.base_url);
        let request = TransportEventRequest { account_id, event };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get an account's current balance (requires a user token, not a
    /// service API key).
    ///
    /// This method is typically used by the mobile app's backend-for-frontend,
    /// not by services.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self, user_token: &str) -> Result<BalanceResponse, ClientError> {
        let url = format!("{}/v1/credits/balance", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("authorization", format!("Bearer {user_token}"))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;
                tracing::debug!(
                    code = %code,
                    status = status.as_u16(),
                    "billing API returned an error"
                );

                // Map specific error codes to typed errors
                match code {
                    "insufficient_credits" => {
                        let balance = api_error
                            .error
                            .details
                            .as_ref()
                            .and_then(|d| d.get("balance"))
                            .and_then(serde_json::Value::as_str)
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(Credits::ZERO);
                        let required = api_error
                            .error
                            .details
                            .as_ref()
                            .and_then(|d| d.get("required"))
                            .and_then(serde_json::Value::as_str)
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(Credits::ZERO);

                        Err(ClientError::InsufficientCredits { balance, required })
                    }
                    "not_found" if message.starts_with("account not found") => {
                        Err(ClientError::AccountNotFound {
                            account_id: message.replace("account not found: ", ""),
                        })
                    }
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = BillingClient::new("http://localhost:8080", "test-api-key");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = BillingClient::new("http://localhost:8080/", "test-api-key");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_options() {
        let options = ClientOptions::with_service_name("parlo-transport");
        let client = BillingClient::with_options("http://localhost:8080", "key", options);
        assert_eq!(client.service_name, "parlo-transport");
    }
}
