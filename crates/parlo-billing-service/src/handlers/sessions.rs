//! Translation session handlers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use parlo_billing_core::{AccountId, CloseReason, Credits, FinalUsage, SessionId, UsageSession};
use parlo_billing_meter::DepletionNotice;

use crate::auth::AuthedAccount;
use crate::error::ApiError;
use crate::state::AppState;

/// Session response.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Session ID.
    pub session_id: String,
    /// Source language code.
    pub language_from: String,
    /// Target language code.
    pub language_to: String,
    /// Transport room token, if the call runs over a shared room.
    pub transport_room: Option<String>,
    /// Seconds of usage accounted for so far.
    pub seconds_used: i64,
    /// Credits charged so far.
    pub credits_used: Credits,
    /// Whether the session is still being metered.
    pub is_active: bool,
    /// Why the session ended, once it has.
    pub close_reason: Option<CloseReason>,
    /// When metering began.
    pub started_at: String,
    /// When the session was finalized.
    pub ended_at: Option<String>,
}

impl From<&UsageSession> for SessionResponse {
    fn from(session: &UsageSession) -> Self {
        Self {
            session_id: session.session_id.to_string(),
            language_from: session.language_from.clone(),
            language_to: session.language_to.clone(),
            transport_room: session.transport_room.clone(),
            seconds_used: session.seconds_used,
            credits_used: session.credits_used,
            is_active: session.is_active,
            close_reason: session.close_reason,
            started_at: session.started_at.to_rfc3339(),
            ended_at: session.ended_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Final usage response for a closed session.
#[derive(Debug, Serialize)]
pub struct FinalUsageResponse {
    /// Session ID.
    pub session_id: String,
    /// Total seconds accounted for.
    pub seconds_used: i64,
    /// Total credit value of the session.
    pub credits_used: Credits,
    /// Why the session ended.
    pub close_reason: CloseReason,
    /// When metering began.
    pub started_at: String,
    /// When the session was finalized.
    pub ended_at: String,
}

impl From<&FinalUsage> for FinalUsageResponse {
    fn from(usage: &FinalUsage) -> Self {
        Self {
            session_id: usage.session_id.to_string(),
            seconds_used: usage.seconds_used,
            credits_used: usage.credits_used,
            close_reason: usage.close_reason,
            started_at: usage.started_at.to_rfc3339(),
            ended_at: usage.ended_at.to_rfc3339(),
        }
    }
}

/// Start session request.
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Source language code (for example "en").
    pub language_from: String,
    /// Target language code (for example "ko").
    pub language_to: String,
    /// Opaque transport room token from the media tier.
    #[serde(default)]
    pub transport_room: Option<String>,
}

/// Start a metered translation session.
///
/// Debits the minimum charge up front; a running session for the same
/// account is superseded first.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
    Json(body): Json<StartSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if body.language_from.trim().is_empty() || body.language_to.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "language_from and language_to are required".into(),
        ));
    }

    let session = state
        .engine
        .start_session(
            auth.account_id,
            body.language_from,
            body.language_to,
            body.transport_room,
        )
        .await?;

    Ok(Json(SessionResponse::from(&session)))
}

/// Stop a session and return its final usage. Idempotent.
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
    Path(session_id): Path<String>,
) -> Result<Json<FinalUsageResponse>, ApiError> {
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid session ID".into()))?;

    // Callers only see their own sessions.
    let session = state.engine.session(&session_id)?;
    if session.account_id != auth.account_id {
        return Err(ApiError::NotFound(format!(
            "session not found: {session_id}"
        )));
    }

    let usage = state.engine.stop_session(&session_id).await?;

    Ok(Json(FinalUsageResponse::from(&usage)))
}

/// Active session response.
#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    /// The active session, or `null` when none is running.
    pub session: Option<SessionResponse>,
}

/// Get the caller's active session, if any.
///
/// Having no active session is not an error; the response carries `null`.
pub async fn get_active_session(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> Result<Json<ActiveSessionResponse>, ApiError> {
    let session = state.engine.active_session(&auth.account_id)?;

    Ok(Json(ActiveSessionResponse {
        session: session.as_ref().map(SessionResponse::from),
    }))
}

/// Session list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Maximum number of sessions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List sessions response.
#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    /// Sessions (newest first).
    pub sessions: Vec<SessionResponse>,
    /// Whether there are more sessions.
    pub has_more: bool,
}

/// List session history.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let sessions = state
        .engine
        .list_sessions(&auth.account_id, limit + 1, query.offset)?;

    let has_more = sessions.len() > limit;
    let sessions: Vec<_> = sessions
        .iter()
        .take(limit)
        .map(SessionResponse::from)
        .collect();

    Ok(Json(ListSessionsResponse { sessions, has_more }))
}

/// WebSocket stream of the caller's depletion notices.
///
/// The app keeps this open during a call; when the session is cut off for
/// lack of credits, the notice arrives here instead of waiting for a poll.
pub async fn watch_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthedAccount,
    ws: WebSocketUpgrade,
) -> Response {
    let notices = state.engine.subscribe_depletions();
    ws.on_upgrade(move |socket| watch_connection(socket, notices, auth.account_id))
}

/// Forward this account's depletion notices until either side hangs up.
async fn watch_connection(
    mut socket: WebSocket,
    mut notices: broadcast::Receiver<DepletionNotice>,
    account_id: AccountId,
) {
    loop {
        let notice = tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) if notice.account_id == account_id => notice,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        account_id = %account_id,
                        skipped,
                        "depletion watch lagged behind the notice stream"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        let payload = match serde_json::to_string(&notice) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(error = %error, "failed to encode depletion notice");
                continue;
            }
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    tracing::debug!(account_id = %account_id, "depletion watch disconnected");
}
