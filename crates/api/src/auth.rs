//! Bearer-token authentication for inventory routes.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use common::CallerContext;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use ledger::InventoryLedger;

/// Header carrying a client-chosen request ID, propagated into the caller context.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authenticates the request and builds its caller context.
///
/// A missing header is rejected without calling the identity authority.
pub async fn caller_context<L: InventoryLedger + 'static>(
    state: &AppState<L>,
    headers: &HeaderMap,
) -> Result<CallerContext, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let ctx = state
        .orchestrator
        .authenticate(token, state.request_timeout)
        .await?;

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok());

    Ok(match request_id {
        Some(id) => ctx.with_request_id(id),
        None => ctx,
    })
}
