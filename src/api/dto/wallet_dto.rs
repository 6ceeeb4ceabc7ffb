//! Wallet DTOs: history, deposits and withdrawals.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{EntryId, LedgerEntry};

/// Query parameters for `GET /wallet/transactions`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Most entries to return (1..=50). Defaults to 50.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    crate::service::wallet::MAX_HISTORY
}

/// Response body for `GET /wallet/transactions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    /// Entries, newest first.
    pub data: Vec<LedgerEntry>,
}

/// Request body for `POST /wallet/deposits/orders`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositOrderRequest {
    /// Amount to deposit.
    pub amount: u64,
}

/// Response body for a created deposit order.
#[derive(Debug, Serialize, ToSchema)]
pub struct DepositOrderResponse {
    /// Reference to hand to the payment gateway.
    pub order_ref: String,
    /// Pending ledger entry.
    pub entry_id: EntryId,
    /// Amount ordered.
    pub amount: u64,
}

/// Request body for `POST /wallet/deposits/verify`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyDepositRequest {
    /// Order reference from the deposit order.
    pub order_ref: String,
    /// Gateway payment reference.
    pub payment_ref: String,
    /// Gateway signature (hex HMAC-SHA256 of `order_ref|payment_ref`).
    pub signature: String,
    /// Amount paid; must match the order.
    pub amount: u64,
}

/// Response body for a verified deposit.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyDepositResponse {
    /// The completed deposit entry.
    pub entry: LedgerEntry,
    /// Balance after the call.
    pub balance: u64,
    /// `false` when the order had been credited before.
    pub credited: bool,
}

/// Request body for `POST /wallet/deposits`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitDepositRequest {
    /// Amount transferred.
    pub amount: u64,
    /// Bank / UPI transaction reference (at least 5 characters).
    pub external_ref: String,
}

/// Request body for `POST /wallet/withdrawals`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawalRequest {
    /// Amount to withdraw.
    pub amount: u64,
    /// Payout destination (e.g. a UPI id).
    pub destination: String,
}

/// Response body for an accepted withdrawal request.
#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalResponse {
    /// Pending withdrawal entry.
    pub entry: LedgerEntry,
    /// Balance after the debit.
    pub balance: u64,
}
