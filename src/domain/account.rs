//! Wallet account aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::AccountId;

/// One user's spendable funds.
///
/// `balance` is unsigned, so a negative balance is unrepresentable; the
/// store primitives reject any debit that would underflow instead of
/// clamping. The aggregates are informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Account {
    /// Stable identity, shared with the identity provider.
    pub id: AccountId,
    /// Human-readable name, used as the default roster display name.
    pub display_name: String,
    /// Spendable balance in the smallest currency unit.
    pub balance: u64,
    /// Sum of all completed deposits.
    pub total_deposited: u64,
    /// Sum of all winnings credited.
    pub total_winnings: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last balance mutation.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an account with a zero balance.
    #[must_use]
    pub fn new(id: AccountId, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            balance: 0,
            total_deposited: 0,
            total_winnings: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style initial balance, used for admin-created accounts.
    #[must_use]
    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_empty() {
        let account = Account::new(AccountId::new(), "ghost");
        assert_eq!(account.balance, 0);
        assert_eq!(account.total_deposited, 0);
        assert_eq!(account.total_winnings, 0);
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn with_balance_sets_only_balance() {
        let account = Account::new(AccountId::new(), "ghost").with_balance(30);
        assert_eq!(account.balance, 30);
        assert_eq!(account.total_deposited, 0);
    }
}
