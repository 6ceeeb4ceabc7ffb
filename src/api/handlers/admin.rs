//! Admin handlers: deposit review, accounts, wallet adjustments and
//! on-demand reconciliation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};

use crate::api::auth::require;
use crate::api::dto::{
    AccountListResponse, AdjustWalletRequest, AdjustWalletResponse, CreateAccountRequest,
    CreateAccountResponse, DeleteAccountResponse, HistoryResponse, ReconcileResponse,
    ReviewDepositRequest,
};
use crate::app_state::AppState;
use crate::domain::{AccountId, Action, Actor, EntryId, LedgerEntry};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /admin/deposits/pending`: Deposits awaiting review, oldest first.
///
/// # Errors
///
/// Returns [`GatewayError::Forbidden`] for non-admins.
#[utoipa::path(
    get,
    path = "/api/v1/admin/deposits/pending",
    tag = "Admin",
    summary = "List pending deposits",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pending deposits", body = HistoryResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
    )
)]
pub async fn pending_deposits(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ReviewDeposits)?;
    let data = state.wallet.pending_deposits().await?;
    Ok(Json(HistoryResponse { data }))
}

/// `POST /admin/deposits/{entry_id}/review`: Approve or reject a deposit.
///
/// # Errors
///
/// Returns [`GatewayError::AlreadyProcessed`] if the deposit was reviewed
/// before; an approval credits the wallet at most once.
#[utoipa::path(
    post,
    path = "/api/v1/admin/deposits/{entry_id}/review",
    tag = "Admin",
    summary = "Review a deposit",
    params(
        ("entry_id" = uuid::Uuid, Path, description = "Ledger entry UUID"),
    ),
    request_body = ReviewDepositRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Reviewed deposit", body = LedgerEntry),
        (status = 404, description = "Deposit not found", body = ErrorResponse),
        (status = 409, description = "Already processed", body = ErrorResponse),
    )
)]
pub async fn review_deposit(
    State(state): State<AppState>,
    actor: Actor,
    Path(entry_id): Path<EntryId>,
    Json(req): Json<ReviewDepositRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ReviewDeposits)?;
    let entry = state
        .wallet
        .review_deposit(entry_id, req.decision, req.notes)
        .await?;
    Ok(Json(entry))
}

/// `GET /admin/accounts`: Every account.
///
/// # Errors
///
/// Returns [`GatewayError::Forbidden`] for non-admins.
#[utoipa::path(
    get,
    path = "/api/v1/admin/accounts",
    tag = "Admin",
    summary = "List accounts",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Accounts", body = AccountListResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
    )
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageAccounts)?;
    let data = state.wallet.list_accounts().await?;
    Ok(Json(AccountListResponse { data }))
}

/// `POST /admin/accounts`: Create an account and mint its token.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a blank display name.
#[utoipa::path(
    post,
    path = "/api/v1/admin/accounts",
    tag = "Admin",
    summary = "Create an account",
    request_body = CreateAccountRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid account", body = ErrorResponse),
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageAccounts)?;
    let account = state
        .wallet
        .create_account(&req.display_name, req.initial_balance)
        .await?;
    let token = state.identity.issue_token(&Actor {
        account_id: account.id,
        role: req.role,
    });
    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse { account, token }),
    ))
}

/// `DELETE /admin/accounts/{id}`: Delete an account and its ledger.
///
/// # Errors
///
/// Returns [`GatewayError::Conflict`] while the account has an unresolved
/// entry-fee charge.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/accounts/{id}",
    tag = "Admin",
    summary = "Delete an account",
    params(
        ("id" = uuid::Uuid, Path, description = "Account UUID"),
    ),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Account deleted", body = DeleteAccountResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 409, description = "Account has an open charge", body = ErrorResponse),
    )
)]
pub async fn delete_account(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<AccountId>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageAccounts)?;
    let entries_removed = state.wallet.delete_account(id).await?;
    Ok(Json(DeleteAccountResponse { entries_removed }))
}

/// `PUT /admin/accounts/{id}/wallet`: Add to or overwrite a balance.
///
/// # Errors
///
/// Returns [`GatewayError::AccountNotFound`] if the account does not exist.
#[utoipa::path(
    put,
    path = "/api/v1/admin/accounts/{id}/wallet",
    tag = "Admin",
    summary = "Adjust a wallet",
    description = "`add` credits the amount with a bonus entry; sending the same `request_id` again applies it once. `set` overwrites the balance.",
    params(
        ("id" = uuid::Uuid, Path, description = "Account UUID"),
    ),
    request_body = AdjustWalletRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Balance after the adjustment", body = AdjustWalletResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn adjust_wallet(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<AccountId>,
    Json(req): Json<AdjustWalletRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::AdjustWallets)?;
    let balance = state
        .wallet
        .adjust(id, req.adjustment(), req.request_id)
        .await?;
    tracing::info!(admin = %actor.account_id, account_id = %id, balance, "wallet adjusted");
    Ok(Json(AdjustWalletResponse {
        account_id: id,
        balance,
    }))
}

/// `POST /admin/reconcile`: Run one reconciliation sweep now.
///
/// # Errors
///
/// Returns [`GatewayError::Persistence`] if the sweep cannot finish.
#[utoipa::path(
    post,
    path = "/api/v1/admin/reconcile",
    tag = "Admin",
    summary = "Run reconciliation",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Sweep report", body = ReconcileResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
    )
)]
pub async fn reconcile(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageAccounts)?;
    let report = state.sweep.run_once().await?;
    Ok(Json(ReconcileResponse { report }))
}

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/deposits/pending", get(pending_deposits))
        .route("/admin/deposits/{entry_id}/review", post(review_deposit))
        .route("/admin/accounts", get(list_accounts).post(create_account))
        .route("/admin/accounts/{id}", delete(delete_account))
        .route("/admin/accounts/{id}/wallet", put(adjust_wallet))
        .route("/admin/reconcile", post(reconcile))
}
