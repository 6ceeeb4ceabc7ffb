//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::api::auth::{bearer_token, require};
use crate::app_state::AppState;
use crate::domain::Action;
use crate::error::GatewayError;

/// Query string accepted by `/ws`. Browsers cannot set headers on a
/// WebSocket handshake, so the bearer token may travel here instead.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuth {
    /// Bearer token.
    pub token: Option<String>,
}

/// `GET /ws`: Upgrade an authenticated HTTP connection to WebSocket.
///
/// The token comes from `Authorization: Bearer` or `?token=`; without a
/// valid one the handshake is refused with 401.
///
/// The receiver is created before the upgrade so no event committed after
/// the handshake is missed.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(auth): Query<WsAuth>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(&headers)
        .or(auth.token.as_deref())
        .ok_or(GatewayError::Unauthenticated)?;
    let actor = state.identity.resolve_identity(token)?;
    require(&actor, Action::ViewMatches)?;

    tracing::debug!(account_id = %actor.account_id, role = %actor.role, "ws connection accepted");
    let event_rx = state.event_bus.subscribe();
    Ok(ws.on_upgrade(move |socket| run_connection(socket, event_rx)))
}
