//! Credit balance, package catalog, and purchase integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn balance_reports_credits_and_talk_seconds() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.auth_header())
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], "10.00");
    assert_eq!(body["talk_seconds_remaining"], 600);
}

#[tokio::test]
async fn balance_requires_a_token() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/credits/balance")
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Package Catalog
// ============================================================================

#[tokio::test]
async fn package_catalog_is_public_and_fixed() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/credits/packages").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    let packages = body["packages"].as_array().unwrap();
    assert_eq!(packages.len(), 4);

    assert_eq!(packages[0]["index"], 0);
    assert_eq!(packages[0]["credits"], "10.00");
    assert_eq!(packages[0]["price_minor_units"], 150);
    assert_eq!(packages[0]["price_formatted"], "$1.50");

    assert_eq!(packages[1]["credits"], "30.00");
    assert_eq!(packages[1]["price_minor_units"], 400);
    assert_eq!(packages[1]["price_formatted"], "$4.00");
}

// ============================================================================
// Balance Check (service-to-service)
// ============================================================================

#[tokio::test]
async fn balance_check_reports_sufficiency() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/v1/credits/check")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": harness.account_id.to_string(),
            "required": "0.05"
        }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["sufficient"], true);
    assert_eq!(body["balance"], "10.00");
    assert_eq!(body["required"], "0.05");
}

#[tokio::test]
async fn balance_check_flags_insufficient_accounts() {
    let harness = TestHarness::new();
    let poor = harness.seed_account("0.04".parse().unwrap());

    let response = harness
        .server
        .post("/v1/credits/check")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": poor.to_string(),
            "required": "0.05"
        }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["sufficient"], false);
    assert_eq!(body["balance"], "0.04");
}

#[tokio::test]
async fn balance_check_rejects_missing_or_wrong_api_key() {
    let harness = TestHarness::new();
    harness.register().await;

    let payload = json!({
        "account_id": harness.account_id.to_string(),
        "required": "0.05"
    });

    harness
        .server
        .post("/v1/credits/check")
        .json(&payload)
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/v1/credits/check")
        .add_header("x-api-key", "wrong-key")
        .json(&payload)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn balance_check_unknown_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/check")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": "00000000-0000-0000-0000-000000000000",
            "required": "0.05"
        }))
        .await;
    response.assert_status_not_found();
}

// ============================================================================
// Purchases
// ============================================================================

#[tokio::test]
async fn initiating_a_purchase_records_it_as_pending() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/v1/purchases")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "package_index": 1 }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["credits_granted"], "30.00");
    assert_eq!(body["amount_minor_units"], 400);
    assert_eq!(body["status"], "pending");
    assert!(body["settled_at"].is_null());

    // Pending purchases grant nothing yet.
    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.auth_header())
        .await;
    let balance: serde_json::Value = response.json();
    assert_eq!(balance["balance"], "10.00");

    // History shows the pending purchase.
    let response = harness
        .server
        .get("/v1/purchases")
        .add_header("authorization", harness.auth_header())
        .await;
    response.assert_status_ok();

    let list: serde_json::Value = response.json();
    let purchases = list["purchases"].as_array().unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0]["purchase_id"], body["purchase_id"]);
    assert_eq!(list["has_more"], false);
}

#[tokio::test]
async fn purchase_with_unknown_package_index_is_rejected() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/v1/purchases")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "package_index": 99 }))
        .await;
    assert_eq!(response.status_code(), 400);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}
