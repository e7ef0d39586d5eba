//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthedAccount` - End-user authentication via bearer-token introspection
//!   against the Parlo auth service
//! - `ServiceAuth` - Service-to-service authentication via API key

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use parlo_billing_core::AccountId;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long a cached introspection result stays valid. Short, so revoked
/// tokens stop working quickly.
const INTROSPECTION_CACHE_TTL: Duration = Duration::from_secs(60);

/// Timeout for introspection requests.
const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Cache entries are dropped wholesale past this size.
const INTROSPECTION_CACHE_MAX_ENTRIES: usize = 10_000;

/// The billing account authenticated by a bearer token.
#[derive(Debug, Clone)]
pub struct AuthedAccount {
    /// The account ID the auth service resolved the token to.
    pub account_id: AccountId,
}

impl FromRequestParts<Arc<AppState>> for AuthedAccount {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            // Extract the Authorization header
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // Extract the Bearer token
            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            // Allow test tokens in testing only.
            // This bypass is gated behind #[cfg(test)] or the "test-auth" feature
            // to ensure it is never active in production builds.
            #[cfg(any(test, feature = "test-auth"))]
            if let Some(account_id_str) = token.strip_prefix("test-token:") {
                let account_id = account_id_str
                    .parse::<AccountId>()
                    .map_err(|_| ApiError::Unauthorized)?;

                return Ok(AuthedAccount { account_id });
            }

            // Resolve the token via the auth service
            let account_id = introspect_token(token, state).await?;

            Ok(AuthedAccount { account_id })
        })
    }
}

/// Service authentication via API key.
///
/// Used for service-to-service requests (e.g., from the transport tier).
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            // Check for X-API-Key header
            let api_key = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // Validate against configured service API key
            let expected_key = state
                .config
                .service_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if api_key != expected_key {
                return Err(ApiError::Unauthorized);
            }

            // Extract service name from header if provided
            let service_name = parts
                .headers
                .get("x-service-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

// ============================================================================
// Token introspection
// ============================================================================

/// Response body of the auth service's `POST /v1/introspect` endpoint.
#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    /// Whether the token is currently valid.
    active: bool,
    /// The account the token belongs to, when active.
    #[serde(default)]
    account_id: Option<String>,
}

/// A cached introspection result.
struct CachedIdentity {
    account_id: AccountId,
    cached_at: Instant,
}

/// Introspection result cache.
struct IntrospectionCache {
    /// Reusable HTTP client for introspection calls.
    /// Creating a new client per request is expensive; reusing it allows
    /// connection pooling and reduces overhead.
    client: reqwest::Client,
    /// Cached results keyed by token fingerprint.
    entries: HashMap<String, CachedIdentity>,
}

impl IntrospectionCache {
    fn new() -> Self {
        // Build client once at initialization; this is called lazily on first use
        let client = reqwest::Client::builder()
            .timeout(INTROSPECTION_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            entries: HashMap::new(),
        }
    }
}

/// Global introspection cache (lazily initialized).
static INTROSPECTION_CACHE: std::sync::OnceLock<RwLock<IntrospectionCache>> =
    std::sync::OnceLock::new();

fn introspection_cache() -> &'static RwLock<IntrospectionCache> {
    INTROSPECTION_CACHE.get_or_init(|| RwLock::new(IntrospectionCache::new()))
}

/// SHA-256 fingerprint of a token, used as the cache key so raw bearer
/// tokens are never held in the cache.
fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Resolve a bearer token to an account via the auth service.
async fn introspect_token(token: &str, state: &AppState) -> Result<AccountId, ApiError> {
    let cache = introspection_cache();
    let fingerprint = token_fingerprint(token);

    // Check cache first
    let client = {
        let cache_read = cache.read().await;
        if let Some(entry) = cache_read.entries.get(&fingerprint) {
            if entry.cached_at.elapsed() < INTROSPECTION_CACHE_TTL {
                return Ok(entry.account_id);
            }
        }
        cache_read.client.clone()
    };

    // Cache miss or expired - ask the auth service
    let url = format!("{}/v1/introspect", state.config.auth_base_url);
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "token": token }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, url = %url, "Failed to reach auth service");
            ApiError::ExternalService("Failed to reach the auth service".into())
        })?;

    if !response.status().is_success() {
        tracing::error!(
            status = %response.status(),
            url = %url,
            "Token introspection returned non-success status"
        );
        return Err(ApiError::ExternalService(
            "Token introspection failed".into(),
        ));
    }

    let introspection: IntrospectionResponse = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse introspection response");
        ApiError::ExternalService("Failed to parse introspection response".into())
    })?;

    if !introspection.active {
        tracing::debug!("Token introspection reported inactive token");
        return Err(ApiError::Unauthorized);
    }

    let account_id = introspection
        .account_id
        .as_deref()
        .and_then(|s| s.parse::<AccountId>().ok())
        .ok_or_else(|| {
            tracing::debug!("Active token without a parsable account_id");
            ApiError::Unauthorized
        })?;

    // Record the result
    let mut cache_write = cache.write().await;
    if cache_write.entries.len() >= INTROSPECTION_CACHE_MAX_ENTRIES {
        cache_write.entries.clear();
    }
    cache_write.entries.insert(
        fingerprint,
        CachedIdentity {
            account_id,
            cached_at: Instant::now(),
        },
    );

    Ok(account_id)
}
