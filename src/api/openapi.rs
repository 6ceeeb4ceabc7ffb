//! OpenAPI document for the REST surface.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::handlers::{admin, matches, system, wallet};
use crate::error::ErrorResponse;

/// Generated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "arena-gateway",
        description = "Wallet ledger and match-entry API for a tournament platform. Amounts are integers in the smallest currency unit."
    ),
    paths(
        system::health_handler,
        matches::list_matches,
        matches::get_match,
        matches::my_matches,
        matches::join_match,
        matches::list_admin_matches,
        matches::create_match,
        matches::update_match,
        matches::change_status,
        matches::delete_match,
        matches::remove_participant,
        wallet::get_wallet,
        wallet::history,
        wallet::create_deposit_order,
        wallet::verify_deposit,
        wallet::submit_deposit,
        wallet::request_withdrawal,
        admin::pending_deposits,
        admin::review_deposit,
        admin::list_accounts,
        admin::create_account,
        admin::delete_account,
        admin::adjust_wallet,
        admin::reconcile,
    ),
    components(schemas(ErrorResponse)),
    modifiers(&BearerAuth),
    tags(
        (name = "Matches", description = "Match listings and joining"),
        (name = "Wallet", description = "Own balance, deposits and withdrawals"),
        (name = "Admin", description = "Operator endpoints"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
