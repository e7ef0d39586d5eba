//! HTTP contract tests for the billing client against a mock server.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parlo_billing_client::{BillingClient, ClientError, ClientOptions};
use parlo_billing_core::{CloseReason, Credits};

// ============================================================================
// Balance Checks
// ============================================================================

#[tokio::test]
async fn check_balance_round_trips() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/credits/check"))
        .and(header("x-api-key", "test-key"))
        .and(header("x-service-name", "parlo-transport"))
        .and(body_json(json!({
            "account_id": "acct-1",
            "required": "0.05"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sufficient": true,
            "balance": "10.00",
            "required": "0.05"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BillingClient::with_options(
        server.uri(),
        "test-key",
        ClientOptions::with_service_name("parlo-transport"),
    );

    let check = client
        .check_balance("acct-1", Credits::from_hundredths(5))
        .await
        .unwrap();
    assert!(check.sufficient);
    assert_eq!(check.balance, Credits::from_whole(10));
    assert_eq!(check.required, Credits::from_hundredths(5));
}

#[tokio::test]
async fn unknown_account_maps_to_account_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/credits/check"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": "not_found",
                "message": "account not found: acct-9"
            }
        })))
        .mount(&server)
        .await;

    let client = BillingClient::new(server.uri(), "test-key");
    let err = client
        .check_balance("acct-9", Credits::from_hundredths(5))
        .await
        .unwrap_err();

    match err {
        ClientError::AccountNotFound { account_id } => assert_eq!(account_id, "acct-9"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn insufficient_credits_maps_to_a_typed_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/credits/check"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "code": "insufficient_credits",
                "message": "insufficient credits: balance=0.04, required=0.05",
                "details": { "balance": "0.04", "required": "0.05" }
            }
        })))
        .mount(&server)
        .await;

    let client = BillingClient::new(server.uri(), "test-key");
    let err = client
        .check_balance("acct-1", Credits::from_hundredths(5))
        .await
        .unwrap_err();

    match err {
        ClientError::InsufficientCredits { balance, required } => {
            assert_eq!(balance, Credits::from_hundredths(4));
            assert_eq!(required, Credits::from_hundredths(5));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unparsable_error_bodies_fall_back_to_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/credits/check"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = BillingClient::new(server.uri(), "test-key");
    let err = client
        .check_balance("acct-1", Credits::from_hundredths(5))
        .await
        .unwrap_err();

    match err {
        ClientError::Api { code, status, .. } => {
            assert_eq!(code, "unknown");
            assert_eq!(status, 500);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Transport Events
// ============================================================================

#[tokio::test]
async fn transport_disconnect_returns_final_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transport/events"))
        .and(body_json(json!({
            "account_id": "acct-1",
            "event": "disconnected"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "acknowledged": true,
            "final_usage": {
                "session_id": "01J0000000000000000000TEST",
                "seconds_used": 9,
                "credits_used": "0.15",
                "close_reason": "disconnected",
                "started_at": "2026-08-23T10:00:00Z",
                "ended_at": "2026-08-23T10:00:09Z"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BillingClient::new(server.uri(), "test-key");
    let response = client.transport_disconnected("acct-1").await.unwrap();

    assert!(response.acknowledged);
    let usage = response.final_usage.unwrap();
    assert_eq!(usage.seconds_used, 9);
    assert_eq!(usage.credits_used, Credits::from_hundredths(15));
    assert_eq!(usage.close_reason, CloseReason::Disconnected);
}

#[tokio::test]
async fn transport_connect_acknowledges_without_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transport/events"))
        .and(body_json(json!({
            "account_id": "acct-1",
            "event": "connected"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "acknowledged": true
        })))
        .mount(&server)
        .await;

    let client = BillingClient::new(server.uri(), "test-key");
    let response = client.transport_connected("acct-1").await.unwrap();

    assert!(response.acknowledged);
    assert!(response.final_usage.is_none());
}

// ============================================================================
// User Balance
// ============================================================================

#[tokio::test]
async fn get_balance_uses_the_user_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/credits/balance"))
        .and(header("authorization", "Bearer user-token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "balance": "9.95",
            "talk_seconds_remaining": 597
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BillingClient::new(server.uri(), "test-key");
    let balance = client.get_balance("user-token-1").await.unwrap();

    assert_eq!(balance.balance, Credits::from_hundredths(995));
    assert_eq!(balance.talk_seconds_remaining, 597);
}
