//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use parlo_billing_core::{Account, Credits, SECONDS_PER_CREDIT};

use crate::auth::AuthedAccount;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub account_id: String,
    /// Current credit balance.
    pub balance: Credits,
    /// How many seconds of translation the balance buys.
    pub talk_seconds_remaining: i64,
    /// Lifetime credits from completed purchases.
    pub lifetime_purchased: Credits,
    /// Lifetime credits spent on sessions.
    pub lifetime_spent: Credits,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            balance: account.balance,
            talk_seconds_remaining: account.balance.hundredths() * SECONDS_PER_CREDIT / 100,
            lifetime_purchased: account.lifetime_purchased,
            lifetime_spent: account.lifetime_spent,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Register the caller's billing account with the starting credit grant.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.engine.create_account(auth.account_id)?;

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the caller's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.engine.account(&auth.account_id)?;

    Ok(Json(AccountResponse::from(&account)))
}
