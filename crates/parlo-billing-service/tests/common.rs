//! Common test utilities for parlo-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use parlo_billing_core::{Account, AccountId, Credits};
use parlo_billing_meter::BillingEngine;
use parlo_billing_service::crypto::hmac_sha256_hex;
use parlo_billing_service::{create_router, AppState, ServiceConfig};
use parlo_billing_store::{RocksStore, Store};

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test account ID for authenticated requests.
    pub account_id: AccountId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The webhook secret the server verifies payment signatures with.
    pub webhook_secret: String,
    /// Direct store handle for seeding accounts.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));
        let engine = BillingEngine::new(store.clone());

        let service_api_key = "test-service-key".to_string();
        let webhook_secret = "test-webhook-secret".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_base_url: "http://localhost".into(),
            service_api_key: Some(service_api_key.clone()),
            payment_webhook_secret: Some(webhook_secret.clone()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        };

        let state = AppState::new(engine, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let account_id = AccountId::generate();

        Self {
            server,
            account_id,
            service_api_key,
            webhook_secret,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Get the authorization header for the default test account.
    pub fn auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.account_id)
    }

    /// Get the authorization header for an arbitrary account.
    pub fn auth_header_for(&self, account_id: &AccountId) -> String {
        format!("Bearer test-token:{account_id}")
    }

    /// Register the default account through the API (grants the starting
    /// credits).
    pub async fn register(&self) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", self.auth_header())
            .await
            .assert_status_ok();
    }

    /// Create an account directly in the store with a chosen balance.
    pub fn seed_account(&self, balance: Credits) -> AccountId {
        let account_id = AccountId::generate();
        self.store
            .put_account(&Account::new(account_id, balance))
            .expect("Failed to seed account");
        account_id
    }

    /// Sign a webhook body the way the payment processor does.
    pub fn sign_webhook(&self, body: &str) -> String {
        hmac_sha256_hex(&self.webhook_secret, body)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
