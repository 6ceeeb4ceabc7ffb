//! Capability checks for authenticated actors.
//!
//! Roles come from the identity provider; what a role may do is decided
//! here and nowhere else, so handlers ask [`can_perform`] instead of
//! comparing role strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AccountId;

/// Role asserted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular player.
    User,
    /// Platform operator.
    Admin,
}

impl Role {
    /// Returns the token/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            // superadmin is an alias kept for tokens issued by older tooling
            "admin" | "superadmin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller's account.
    pub account_id: AccountId,
    /// Caller's role.
    pub role: Role,
}

/// Operations subject to a capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Browse matches.
    ViewMatches,
    /// Join a match with one's own wallet.
    JoinMatch,
    /// Deposit, withdraw and read one's own wallet.
    ManageWallet,
    /// Create, edit, cancel and delete matches; remove participants.
    ManageMatches,
    /// Approve or reject deposits.
    ReviewDeposits,
    /// Add to or overwrite wallet balances.
    AdjustWallets,
    /// Create, list and delete accounts; run reconciliation.
    ManageAccounts,
}

/// Returns `true` if `actor` may perform `action`.
#[must_use]
pub const fn can_perform(actor: &Actor, action: Action) -> bool {
    match action {
        Action::ViewMatches | Action::JoinMatch | Action::ManageWallet => true,
        Action::ManageMatches
        | Action::ReviewDeposits
        | Action::AdjustWallets
        | Action::ManageAccounts => matches!(actor.role, Role::Admin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor {
            account_id: AccountId::new(),
            role,
        }
    }

    #[test]
    fn users_manage_only_their_own_wallet() {
        let user = actor(Role::User);
        assert!(can_perform(&user, Action::JoinMatch));
        assert!(can_perform(&user, Action::ManageWallet));
        assert!(!can_perform(&user, Action::ManageMatches));
        assert!(!can_perform(&user, Action::AdjustWallets));
        assert!(!can_perform(&user, Action::ReviewDeposits));
    }

    #[test]
    fn admins_can_do_everything() {
        let admin = actor(Role::Admin);
        for action in [
            Action::ViewMatches,
            Action::JoinMatch,
            Action::ManageWallet,
            Action::ManageMatches,
            Action::ReviewDeposits,
            Action::AdjustWallets,
            Action::ManageAccounts,
        ] {
            assert!(can_perform(&admin, action));
        }
    }

    #[test]
    fn superadmin_parses_as_admin() {
        assert_eq!("superadmin".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
    }
}
