//! Wallet handlers: balance, history, deposits and withdrawals.
//!
//! Every route acts on the caller's own account.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::require;
use crate::api::dto::{
    DepositOrderRequest, DepositOrderResponse, HistoryParams, HistoryResponse,
    SubmitDepositRequest, VerifyDepositRequest, VerifyDepositResponse, WithdrawalRequest,
    WithdrawalResponse,
};
use crate::app_state::AppState;
use crate::domain::{Account, Action, Actor, LedgerEntry};
use crate::error::{ErrorResponse, GatewayError};
use crate::service::PaymentProof;

/// `GET /wallet`: The caller's account and balance.
///
/// # Errors
///
/// Returns [`GatewayError::AccountNotFound`] if the token's account is gone.
#[utoipa::path(
    get,
    path = "/api/v1/wallet",
    tag = "Wallet",
    summary = "Get own wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Account with balance", body = Account),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageWallet)?;
    let account = state.wallet.account(actor.account_id).await?;
    Ok(Json(account))
}

/// `GET /wallet/transactions`: Own ledger history, newest first.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/wallet/transactions",
    tag = "Wallet",
    summary = "Transaction history",
    params(HistoryParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Ledger entries", body = HistoryResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn history(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageWallet)?;
    let data = state.wallet.history(actor.account_id, params.limit).await?;
    Ok(Json(HistoryResponse { data }))
}

/// `POST /wallet/deposits/orders`: Open a payment-gateway deposit.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] below the minimum deposit.
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposits/orders",
    tag = "Wallet",
    summary = "Create a deposit order",
    request_body = DepositOrderRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Pending deposit order", body = DepositOrderResponse),
        (status = 400, description = "Amount below minimum", body = ErrorResponse),
    )
)]
pub async fn create_deposit_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<DepositOrderRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageWallet)?;
    let entry = state
        .wallet
        .create_deposit_order(actor.account_id, req.amount)
        .await?;
    let order_ref = entry.external_ref.clone().ok_or_else(|| {
        GatewayError::Internal("deposit order stored without a reference".to_string())
    })?;
    Ok((
        StatusCode::CREATED,
        Json(DepositOrderResponse {
            order_ref,
            entry_id: entry.id,
            amount: entry.amount,
        }),
    ))
}

/// `POST /wallet/deposits/verify`: Verify a gateway payment and credit it.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidSignature`] if the signature does not
/// verify; nothing is credited in that case.
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposits/verify",
    tag = "Wallet",
    summary = "Verify and credit a deposit",
    description = "Credits the order exactly once. Replaying the same verification returns the stored entry with `credited = false`.",
    request_body = VerifyDepositRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deposit credited", body = VerifyDepositResponse),
        (status = 400, description = "Invalid signature", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
    )
)]
pub async fn verify_deposit(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<VerifyDepositRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageWallet)?;
    let receipt = state
        .wallet
        .verify_and_credit_deposit(
            &req.order_ref,
            PaymentProof {
                payment_ref: req.payment_ref,
                signature: req.signature,
            },
            actor.account_id,
            req.amount,
        )
        .await?;
    Ok(Json(VerifyDepositResponse {
        entry: receipt.entry,
        balance: receipt.balance,
        credited: receipt.credited,
    }))
}

/// `POST /wallet/deposits`: Submit a manual deposit for admin review.
///
/// # Errors
///
/// Returns [`GatewayError::DuplicateExternalReference`] if the reference was
/// used before.
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposits",
    tag = "Wallet",
    summary = "Submit a manual deposit",
    request_body = SubmitDepositRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Pending deposit", body = LedgerEntry),
        (status = 400, description = "Invalid amount or reference", body = ErrorResponse),
        (status = 409, description = "Reference already used", body = ErrorResponse),
    )
)]
pub async fn submit_deposit(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<SubmitDepositRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageWallet)?;
    let entry = state
        .wallet
        .submit_deposit(actor.account_id, req.amount, &req.external_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /wallet/withdrawals`: Debit the wallet and queue a payout.
///
/// # Errors
///
/// Returns [`GatewayError::InsufficientFunds`] if the balance is short.
#[utoipa::path(
    post,
    path = "/api/v1/wallet/withdrawals",
    tag = "Wallet",
    summary = "Request a withdrawal",
    request_body = WithdrawalRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Withdrawal queued", body = WithdrawalResponse),
        (status = 400, description = "Amount below minimum", body = ErrorResponse),
        (status = 422, description = "Insufficient funds", body = ErrorResponse),
    )
)]
pub async fn request_withdrawal(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<WithdrawalRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageWallet)?;
    let (entry, balance) = state
        .wallet
        .request_withdrawal(actor.account_id, req.amount, &req.destination)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(WithdrawalResponse { entry, balance }),
    ))
}

/// Wallet routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallet/transactions", get(history))
        .route("/wallet/deposits", post(submit_deposit))
        .route("/wallet/deposits/orders", post(create_deposit_order))
        .route("/wallet/deposits/verify", post(verify_deposit))
        .route("/wallet/withdrawals", post(request_withdrawal))
}
