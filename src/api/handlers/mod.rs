//! REST endpoint handlers organized by resource.

pub mod admin;
pub mod matches;
pub mod system;
pub mod wallet;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(matches::routes())
        .merge(wallet::routes())
        .merge(admin::routes())
}
