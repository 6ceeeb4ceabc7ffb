//! Bearer authentication and capability checks for handlers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::domain::policy::can_perform;
use crate::domain::{Action, Actor};
use crate::error::GatewayError;

impl FromRequestParts<AppState> for Actor {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(GatewayError::Unauthenticated)?;
        state.identity.resolve_identity(token)
    }
}

/// Token from an `Authorization: Bearer` header, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Fails with [`GatewayError::Forbidden`] unless `actor` may perform `action`.
///
/// # Errors
///
/// Returns [`GatewayError::Forbidden`] when the role lacks the capability.
pub fn require(actor: &Actor, action: Action) -> Result<(), GatewayError> {
    if can_perform(actor, action) {
        Ok(())
    } else {
        tracing::warn!(account_id = %actor.account_id, role = %actor.role, ?action, "capability check failed");
        Err(GatewayError::Forbidden)
    }
}
