//! Admin DTOs: deposit review, accounts and wallet adjustments.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Account, AccountId, Role};
use crate::service::{ReviewDecision, SweepReport, WalletAdjustment};

/// Request body for `POST /admin/deposits/{entry_id}/review`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewDepositRequest {
    /// Approve or reject.
    pub decision: ReviewDecision,
    /// Notes stored on the entry.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for `POST /admin/accounts`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    /// Display name.
    pub display_name: String,
    /// Opening balance, recorded as a bonus entry.
    #[serde(default)]
    pub initial_balance: u64,
    /// Role embedded in the issued token.
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

/// Response body for a created account.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateAccountResponse {
    /// The new account.
    pub account: Account,
    /// Bearer token for the account, when the identity provider mints them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Response body for `GET /admin/accounts`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountListResponse {
    /// Accounts, newest first.
    pub data: Vec<Account>,
}

/// How an adjustment changes the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdjustMode {
    /// Credit the amount.
    Add,
    /// Overwrite the balance.
    Set,
}

/// Request body for `PUT /admin/accounts/{id}/wallet`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustWalletRequest {
    /// Add or set.
    pub mode: AdjustMode,
    /// Amount to add, or the new balance.
    pub amount: u64,
    /// Makes a retried `add` apply once.
    #[serde(default)]
    pub request_id: Option<uuid::Uuid>,
}

impl AdjustWalletRequest {
    /// Converts into the service-level adjustment.
    #[must_use]
    pub const fn adjustment(&self) -> WalletAdjustment {
        match self.mode {
            AdjustMode::Add => WalletAdjustment::Add(self.amount),
            AdjustMode::Set => WalletAdjustment::Set(self.amount),
        }
    }
}

/// Response body for a wallet adjustment.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdjustWalletResponse {
    /// Adjusted account.
    pub account_id: AccountId,
    /// Balance after the adjustment.
    pub balance: u64,
}

/// Response body for `DELETE /admin/accounts/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteAccountResponse {
    /// Ledger entries removed with the account.
    pub entries_removed: usize,
}

/// Response body for `POST /admin/reconcile`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileResponse {
    /// What the sweep did.
    #[serde(flatten)]
    pub report: SweepReport,
}
