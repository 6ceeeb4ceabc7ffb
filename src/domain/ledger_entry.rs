//! Immutable ledger entries and charge holds.
//!
//! A [`LedgerEntry`] records one balance-affecting event. Entries are
//! append-only: after creation only `status` (one-way) and annotation
//! fields (`admin_notes`, `payment_ref`, `description`) may change.
//!
//! A [`ChargeHold`] is the journal record of an entry-fee debit whose join
//! has not resolved yet. It is removed exactly once, either by settling it
//! into a completed `entry_fee` entry or by releasing it back to the wallet.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AccountId, EntryId, JoinId, MatchId};

/// What kind of balance change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Funds added from outside the platform.
    Deposit,
    /// Funds paid out to the user.
    Withdrawal,
    /// Charge for joining a match.
    EntryFee,
    /// Prize credited after a match.
    Winnings,
    /// Entry fee returned after cancellation, deletion or removal.
    Refund,
    /// Discretionary credit (admin adjustment, promotions).
    Bonus,
    /// Referral reward.
    Referral,
}

impl EntryKind {
    /// Returns the storage/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::EntryFee => "entry_fee",
            Self::Winnings => "winnings",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
            Self::Referral => "referral",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "entry_fee" => Ok(Self::EntryFee),
            "winnings" => Ok(Self::Winnings),
            "refund" => Ok(Self::Refund),
            "bonus" => Ok(Self::Bonus),
            "referral" => Ok(Self::Referral),
            other => Err(format!("unknown entry kind: {other}")),
        }
    }
}

/// Processing state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Awaiting verification or payout.
    Pending,
    /// Being processed by an external party.
    Processing,
    /// Applied to the balance.
    Completed,
    /// Failed at an external party.
    Failed,
    /// Withdrawn by the requester.
    Cancelled,
    /// Refused by an admin.
    Rejected,
}

impl EntryStatus {
    /// Returns the storage/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    /// Returns `true` once the entry can no longer change status.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// Why a participant is being refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// The match was cancelled by an admin.
    MatchCancelled,
    /// The match was deleted by an admin.
    MatchDeleted,
    /// The participant was removed from the roster by an admin.
    ParticipantRemoved,
}

impl RefundReason {
    /// Returns the stable key fragment for this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MatchCancelled => "cancelled",
            Self::MatchDeleted => "deleted",
            Self::ParticipantRemoved => "removed",
        }
    }

    /// Renders the human-readable ledger description for a match title.
    #[must_use]
    pub fn describe(&self, match_title: &str) -> String {
        match self {
            Self::MatchCancelled => format!("Refund: \"{match_title}\" was cancelled"),
            Self::MatchDeleted => format!("Refund: \"{match_title}\" was deleted by admin"),
            Self::ParticipantRemoved => {
                format!("Refund: removed from \"{match_title}\" by admin")
            }
        }
    }
}

/// Value guaranteeing a credit is applied at most once.
///
/// Refund keys are derived from the roster seat being refunded, so every
/// `(match, participant)` pair maps to exactly one key no matter how many
/// times a cancellation is retried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for refunding one roster seat.
    #[must_use]
    pub fn refund(match_id: MatchId, account_id: AccountId, seat: JoinId) -> Self {
        Self(format!("refund:{match_id}:{account_id}:{seat}"))
    }

    /// Key for the entry-fee settlement of one join attempt.
    #[must_use]
    pub fn entry_fee(join: JoinId) -> Self {
        Self(format!("entry_fee:{join}"))
    }

    /// Key for an admin wallet adjustment request.
    #[must_use]
    pub fn adjustment(request: uuid::Uuid) -> Self {
        Self(format!("adjust:{request}"))
    }

    /// Wraps a stored key.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable audit record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LedgerEntry {
    /// Entry identity.
    pub id: EntryId,
    /// Account whose balance changed.
    pub account_id: AccountId,
    /// Kind of change.
    pub kind: EntryKind,
    /// Positive amount in the smallest currency unit.
    pub amount: u64,
    /// Processing state.
    pub status: EntryStatus,
    /// External reference (payment order / UPI transaction id), globally unique.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    /// Idempotency key, globally unique when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    /// Weak reference to the match this entry concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_match_id: Option<MatchId>,
    /// Human-readable description.
    pub description: String,
    /// Gateway payment reference recorded on verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    /// Payout destination for withdrawals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Notes left by the reviewing admin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status/annotation change.
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates an entry with no references or annotations.
    #[must_use]
    pub fn new(account_id: AccountId, kind: EntryKind, amount: u64, status: EntryStatus) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            account_id,
            kind,
            amount,
            status,
            external_ref: None,
            idempotency_key: None,
            related_match_id: None,
            description: String::new(),
            payment_ref: None,
            destination: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the external reference.
    #[must_use]
    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Sets the related match.
    #[must_use]
    pub fn with_match(mut self, match_id: MatchId) -> Self {
        self.related_match_id = Some(match_id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the payout destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Journal record of an entry-fee debit awaiting its seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChargeHold {
    /// Join attempt this hold belongs to.
    pub id: JoinId,
    /// Debited account.
    pub account_id: AccountId,
    /// Match being joined.
    pub match_id: MatchId,
    /// Amount debited.
    pub amount: u64,
    /// When the debit was applied.
    pub created_at: DateTime<Utc>,
}

impl ChargeHold {
    /// Creates a hold for a new join attempt.
    #[must_use]
    pub fn new(account_id: AccountId, match_id: MatchId, amount: u64) -> Self {
        Self {
            id: JoinId::new(),
            account_id,
            match_id,
            amount,
            created_at: Utc::now(),
        }
    }

    /// Builds the completed `entry_fee` entry that settles this hold.
    #[must_use]
    pub fn settlement_entry(&self, match_title: &str) -> LedgerEntry {
        LedgerEntry::new(
            self.account_id,
            EntryKind::EntryFee,
            self.amount,
            EntryStatus::Completed,
        )
        .with_match(self.match_id)
        .with_idempotency_key(IdempotencyKey::entry_fee(self.id))
        .with_description(format!("Entry fee for {match_title}"))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            EntryKind::Deposit,
            EntryKind::Withdrawal,
            EntryKind::EntryFee,
            EntryKind::Winnings,
            EntryKind::Refund,
            EntryKind::Bonus,
            EntryKind::Referral,
        ] {
            assert_eq!(kind.as_str().parse::<EntryKind>(), Ok(kind));
        }
        assert!("jackpot".parse::<EntryKind>().is_err());
    }

    #[test]
    fn status_finality() {
        assert!(!EntryStatus::Pending.is_final());
        assert!(!EntryStatus::Processing.is_final());
        assert!(EntryStatus::Completed.is_final());
        assert!(EntryStatus::Rejected.is_final());
        assert_eq!("rejected".parse::<EntryStatus>(), Ok(EntryStatus::Rejected));
    }

    #[test]
    fn refund_keys_are_per_seat() {
        let match_id = MatchId::new();
        let account = AccountId::new();
        let seat = JoinId::new();
        assert_eq!(
            IdempotencyKey::refund(match_id, account, seat),
            IdempotencyKey::refund(match_id, account, seat)
        );
        assert_ne!(
            IdempotencyKey::refund(match_id, account, seat),
            IdempotencyKey::refund(match_id, account, JoinId::new())
        );
    }

    #[test]
    fn settlement_entry_references_match() {
        let hold = ChargeHold::new(AccountId::new(), MatchId::new(), 20);
        let entry = hold.settlement_entry("Erangel Squad");
        assert_eq!(entry.kind, EntryKind::EntryFee);
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.amount, 20);
        assert_eq!(entry.related_match_id, Some(hold.match_id));
        assert_eq!(entry.description, "Entry fee for Erangel Squad");
        assert_eq!(
            entry.idempotency_key,
            Some(IdempotencyKey::entry_fee(hold.id))
        );
    }

    #[test]
    fn serialized_entry_omits_empty_references() {
        let entry = LedgerEntry::new(
            AccountId::new(),
            EntryKind::Deposit,
            100,
            EntryStatus::Pending,
        );
        let Ok(json) = serde_json::to_value(&entry) else {
            panic!("serialization failed");
        };
        assert_eq!(json["kind"], "deposit");
        assert_eq!(json["status"], "pending");
        assert!(json.get("external_ref").is_none());
    }
}
