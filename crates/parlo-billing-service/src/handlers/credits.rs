//! Credit balance, package catalog, and purchase handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use parlo_billing_core::{Credits, Purchase, PurchaseStatus, CREDIT_PACKAGES, SECONDS_PER_CREDIT};

use crate::auth::{AuthedAccount, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current credit balance.
    pub balance: Credits,
    /// How many seconds of translation the balance buys.
    pub talk_seconds_remaining: i64,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.engine.balance(&auth.account_id)?;

    Ok(Json(BalanceResponse {
        balance,
        talk_seconds_remaining: balance.hundredths() * SECONDS_PER_CREDIT / 100,
    }))
}

/// A purchasable credit package.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    /// Catalog index, sent back when initiating a purchase.
    pub index: usize,
    /// Credits granted.
    pub credits: Credits,
    /// Price in minor currency units.
    pub price_minor_units: i64,
    /// Price formatted as dollars.
    pub price_formatted: String,
}

/// Package catalog response.
#[derive(Debug, Serialize)]
pub struct ListPackagesResponse {
    /// Packages, ordered small to large.
    pub packages: Vec<PackageResponse>,
}

/// List the purchasable credit packages.
pub async fn list_packages() -> Json<ListPackagesResponse> {
    let packages = CREDIT_PACKAGES
        .iter()
        .enumerate()
        .map(|(index, package)| PackageResponse {
            index,
            credits: package.credits,
            price_minor_units: package.price_minor_units,
            price_formatted: format!("${:.2}", package.price_minor_units as f64 / 100.0),
        })
        .collect();

    Json(ListPackagesResponse { packages })
}

/// Check balance request.
#[derive(Debug, Deserialize)]
pub struct CheckBalanceRequest {
    /// Account to check.
    pub account_id: String,
    /// Required credit amount.
    pub required: Credits,
}

/// Check balance response.
#[derive(Debug, Serialize)]
pub struct CheckBalanceResponse {
    /// Whether the account can cover the required amount.
    pub sufficient: bool,
    /// Current balance.
    pub balance: Credits,
    /// Required amount.
    pub required: Credits,
}

/// Check whether an account can cover a charge. Pre-flight gate for the
/// transport tier before it reserves media resources.
pub async fn check_balance(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CheckBalanceRequest>,
) -> Result<Json<CheckBalanceResponse>, ApiError> {
    let account_id = body
        .account_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid account ID".into()))?;

    let balance = state.engine.balance(&account_id)?;

    Ok(Json(CheckBalanceResponse {
        sufficient: balance >= body.required,
        balance,
        required: body.required,
    }))
}

/// Purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// Purchase ID. The payment processor echoes this back in webhooks.
    pub purchase_id: String,
    /// Credits granted when the purchase completes.
    pub credits_granted: Credits,
    /// Price in minor currency units.
    pub amount_minor_units: i64,
    /// Settlement state.
    pub status: PurchaseStatus,
    /// When the purchase was initiated.
    pub created_at: String,
    /// When the purchase settled, if it has.
    pub settled_at: Option<String>,
}

impl From<&Purchase> for PurchaseResponse {
    fn from(purchase: &Purchase) -> Self {
        Self {
            purchase_id: purchase.purchase_id.to_string(),
            credits_granted: purchase.credits_granted,
            amount_minor_units: purchase.amount_minor_units,
            status: purchase.status,
            created_at: purchase.created_at.to_rfc3339(),
            settled_at: purchase.settled_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Initiate purchase request.
#[derive(Debug, Deserialize)]
pub struct InitiatePurchaseRequest {
    /// Catalog index of the package to buy.
    pub package_index: usize,
}

/// Initiate a credit purchase.
///
/// Records the purchase as pending; credits land when the payment processor
/// confirms via webhook.
pub async fn initiate_purchase(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
    Json(body): Json<InitiatePurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let purchase = state
        .engine
        .initiate_purchase(auth.account_id, body.package_index)?;

    Ok(Json(PurchaseResponse::from(&purchase)))
}

/// Purchase list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListPurchasesQuery {
    /// Maximum number of purchases to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List purchases response.
#[derive(Debug, Serialize)]
pub struct ListPurchasesResponse {
    /// Purchases (newest first).
    pub purchases: Vec<PurchaseResponse>,
    /// Whether there are more purchases.
    pub has_more: bool,
}

/// List purchase history.
pub async fn list_purchases(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
    Query(query): Query<ListPurchasesQuery>,
) -> Result<Json<ListPurchasesResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let purchases = state
        .engine
        .list_purchases(&auth.account_id, limit + 1, query.offset)?;

    let has_more = purchases.len() > limit;
    let purchases: Vec<_> = purchases
        .iter()
        .take(limit)
        .map(PurchaseResponse::from)
        .collect();

    Ok(Json(ListPurchasesResponse {
        purchases,
        has_more,
    }))
}
