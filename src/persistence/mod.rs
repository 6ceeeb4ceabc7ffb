//! Persistence layer: the ledger store and its atomic primitives.
//!
//! [`LedgerStore`] is the only component with a global view across
//! concurrent requests, so every invariant-bearing mutation is a single
//! store primitive (a conditional update or one transaction). Callers never
//! hold an in-process lock across a store call.
//!
//! Expected domain outcomes (insufficient funds, full match, duplicate
//! reference, ...) are returned as typed outcome enums; [`StoreError`] is
//! reserved for infrastructure failures.
//!
//! Two implementations ship: [`memory::MemoryLedgerStore`] and
//! [`postgres::PostgresLedgerStore`].

pub mod memory;
pub mod models;
pub mod postgres;
pub mod retry;
#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::domain::{
    Account, AccountId, ChargeHold, EntryId, EntryStatus, IdempotencyKey, JoinId, LedgerEntry,
    Match, MatchId, MatchStatus, Participant, RoomCredentials,
};

pub use memory::MemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use retry::ReadRetry;

/// Infrastructure failure inside the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database driver reported an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back into the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A credit would overflow the balance representation.
    #[error("balance overflow on account {0}")]
    Overflow(AccountId),
}

impl StoreError {
    /// Returns `true` for failures worth retrying on an idempotent read.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
            )
        )
    }
}

/// Boxed future returned by every store primitive.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Journal record written atomically with a debit.
#[derive(Debug, Clone)]
pub enum DebitRecord {
    /// Entry-fee debit awaiting its seat.
    Hold(ChargeHold),
    /// Debit recorded directly as a ledger entry (e.g. a withdrawal request).
    Entry(LedgerEntry),
}

/// Result of [`LedgerStore::debit_if_sufficient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Debit and journal record committed together.
    Applied {
        /// Balance after the debit.
        new_balance: u64,
    },
    /// Balance too low; nothing changed.
    InsufficientFunds {
        /// Balance observed by the failed conditional update.
        balance: u64,
    },
    /// No such account.
    AccountNotFound,
}

/// Result of [`LedgerStore::credit`]. An unkeyed credit always applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlainCreditOutcome {
    /// Credit committed.
    Applied {
        /// Balance after the credit.
        new_balance: u64,
    },
    /// No such account.
    AccountNotFound,
}

/// Result of [`LedgerStore::credit_with_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Credit committed.
    Applied {
        /// Balance after the credit.
        new_balance: u64,
    },
    /// The entry's idempotency key was already used; nothing changed.
    AlreadyApplied,
    /// No such account.
    AccountNotFound,
}

/// Result of [`LedgerStore::append_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Entry stored.
    Appended,
    /// Another entry already carries this external reference.
    DuplicateExternalReference,
    /// Another entry already carries this idempotency key.
    DuplicateIdempotencyKey,
    /// No such account.
    AccountNotFound,
}

/// Result of resolving a [`ChargeHold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Hold removed and the entry-fee entry recorded at the held amount.
    Settled {
        /// Amount the hold debited, which is what the entry records.
        amount: u64,
    },
    /// Hold removed and its amount credited back.
    Released {
        /// Balance after the compensating credit.
        new_balance: u64,
    },
    /// The hold was already resolved by someone else.
    HoldMissing,
}

/// How a pending deposit is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLocator {
    /// By ledger entry id (admin review).
    Id(EntryId),
    /// By external reference (gateway callback).
    ExternalRef(String),
    /// By idempotency key.
    IdempotencyKey(IdempotencyKey),
}

/// Result of a pending-deposit transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositTransition {
    /// `pending → completed`; balance and `total_deposited` credited.
    Completed {
        /// The updated entry.
        entry: LedgerEntry,
        /// Balance after the credit.
        new_balance: u64,
    },
    /// `pending → rejected`; no balance change.
    Rejected {
        /// The updated entry.
        entry: LedgerEntry,
    },
    /// Entry was not pending; nothing changed.
    NotPending {
        /// The entry as found.
        entry: LedgerEntry,
    },
    /// No matching deposit entry.
    NotFound,
}

/// Result of [`LedgerStore::delete_account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAccountOutcome {
    /// Account and its ledger removed.
    Deleted {
        /// Number of ledger entries removed with it.
        entries_removed: usize,
    },
    /// The account still has unresolved charge holds.
    HasOpenHolds,
    /// No such account.
    NotFound,
}

/// Selection for [`LedgerStore::list_matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFilter {
    /// Only matches in one of these states (all when `None`).
    pub statuses: Option<Vec<MatchStatus>>,
    /// Only matches this account is seated in.
    pub participant: Option<AccountId>,
}

impl MatchFilter {
    /// Matches in any of the given states.
    #[must_use]
    pub fn with_statuses(statuses: &[MatchStatus]) -> Self {
        Self {
            statuses: Some(statuses.to_vec()),
            participant: None,
        }
    }

    /// Returns `true` if `m` passes the filter.
    #[must_use]
    pub fn accepts(&self, m: &Match) -> bool {
        let status_ok = self
            .statuses
            .as_ref()
            .is_none_or(|statuses| statuses.contains(&m.status));
        let participant_ok = self
            .participant
            .is_none_or(|account_id| m.is_participant(account_id));
        status_ok && participant_ok
    }
}

/// Partial update of a match's admin-editable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPatch {
    /// New title.
    pub title: Option<String>,
    /// New map.
    pub map: Option<String>,
    /// New mode.
    pub mode: Option<String>,
    /// New entry fee; refused once anyone has joined.
    pub entry_fee: Option<u64>,
    /// New prize pool.
    pub prize_pool: Option<u64>,
    /// New per-kill bonus.
    pub per_kill_bonus: Option<u64>,
    /// New capacity; refused below the current roster size.
    pub capacity: Option<u32>,
    /// New scheduled start.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// New room credentials.
    pub room: Option<RoomCredentials>,
}

impl MatchPatch {
    /// Applies the patch to `m`, checking roster-dependent constraints.
    ///
    /// # Errors
    ///
    /// Returns the [`UpdateOutcome`] describing the violated constraint.
    pub fn apply(&self, m: &mut Match) -> Result<(), UpdateOutcome> {
        if let Some(capacity) = self.capacity
            && (capacity as usize) < m.roster.len()
        {
            return Err(UpdateOutcome::CapacityBelowRoster {
                participants: m.roster.len(),
            });
        }
        if let Some(fee) = self.entry_fee
            && fee != m.spec.entry_fee
            && !m.roster.is_empty()
        {
            return Err(UpdateOutcome::EntryFeeLocked);
        }

        if let Some(title) = &self.title {
            m.spec.title.clone_from(title);
        }
        if let Some(map) = &self.map {
            m.spec.map.clone_from(map);
        }
        if let Some(mode) = &self.mode {
            m.spec.mode.clone_from(mode);
        }
        if let Some(fee) = self.entry_fee {
            m.spec.entry_fee = fee;
        }
        if let Some(prize) = self.prize_pool {
            m.spec.prize_pool = prize;
        }
        if let Some(bonus) = self.per_kill_bonus {
            m.spec.per_kill_bonus = bonus;
        }
        if let Some(capacity) = self.capacity {
            m.spec.capacity = capacity;
        }
        if let Some(time) = self.scheduled_time {
            m.spec.scheduled_time = time;
        }
        if let Some(room) = &self.room {
            m.room = room.clone();
        }
        m.updated_at = Utc::now();
        Ok(())
    }
}

/// Result of [`LedgerStore::update_match`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Patch applied.
    Updated(Box<Match>),
    /// Capacity would drop below the seated participants.
    CapacityBelowRoster {
        /// Current roster size.
        participants: usize,
    },
    /// Entry fee cannot change once someone has paid it.
    EntryFeeLocked,
    /// No such match.
    NotFound,
}

/// Result of [`LedgerStore::reserve_seat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Seat appended to the roster.
    Reserved {
        /// Roster size after the reservation.
        participant_count: usize,
    },
    /// No seat left.
    MatchFull,
    /// The account already holds a seat.
    AlreadyJoined,
    /// The match is not `upcoming`.
    MatchNotOpen,
    /// No such match.
    MatchNotFound,
}

/// Result of [`LedgerStore::release_seat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Seat removed.
    Released {
        /// The removed participant.
        participant: Participant,
        /// Roster size after the release.
        participant_count: usize,
    },
    /// The account holds no (matching) seat.
    NotAParticipant,
    /// No such match.
    MatchNotFound,
}

/// Result of [`LedgerStore::transition_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status changed; carries the roster snapshot taken in the same step.
    Changed {
        /// State before the change.
        previous: MatchStatus,
        /// The match after the change.
        current: Box<Match>,
    },
    /// The lifecycle forbids this transition.
    Rejected {
        /// Current state.
        current: MatchStatus,
    },
    /// No such match.
    NotFound,
}

/// Durable record of accounts, ledger entries, charge holds and matches.
///
/// Every method is one atomic step relative to concurrent callers: for a
/// given account, debits and credits are linearizable; for a given match,
/// roster mutations are linearizable with the capacity check.
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    // ── Accounts ─────────────────────────────────────────────────────────

    /// Inserts a new account. Returns `false` if the id already exists.
    fn insert_account(&self, account: Account) -> StoreFuture<'_, bool>;

    /// Loads an account.
    fn get_account(&self, id: AccountId) -> StoreFuture<'_, Option<Account>>;

    /// Loads all accounts, newest first.
    fn list_accounts(&self) -> StoreFuture<'_, Vec<Account>>;

    /// Deletes an account together with its ledger.
    fn delete_account(&self, id: AccountId) -> StoreFuture<'_, DeleteAccountOutcome>;

    // ── Balance primitives ───────────────────────────────────────────────

    /// Debits `amount` only if the balance covers it, writing `record` in
    /// the same atomic step.
    fn debit_if_sufficient(
        &self,
        id: AccountId,
        amount: u64,
        record: DebitRecord,
    ) -> StoreFuture<'_, DebitOutcome>;

    /// Credits `amount` with no ledger entry.
    fn credit(&self, id: AccountId, amount: u64) -> StoreFuture<'_, PlainCreditOutcome>;

    /// Credits `entry.amount` to `entry.account_id` and appends `entry` in
    /// one step. When the entry carries an idempotency key that was used
    /// before, nothing changes and [`CreditOutcome::AlreadyApplied`] is
    /// returned.
    fn credit_with_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, CreditOutcome>;

    /// Overwrites the balance. Returns the new balance, or `None` if the
    /// account does not exist.
    fn set_balance(&self, id: AccountId, balance: u64) -> StoreFuture<'_, Option<u64>>;

    // ── Ledger ───────────────────────────────────────────────────────────

    /// Appends an entry without touching the balance.
    fn append_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, AppendOutcome>;

    /// Loads an entry by id, external reference or idempotency key.
    fn find_entry(&self, locator: EntryLocator) -> StoreFuture<'_, Option<LedgerEntry>>;

    /// Loads an account's entries, newest first, at most `limit`.
    fn list_entries(&self, account_id: AccountId, limit: usize)
    -> StoreFuture<'_, Vec<LedgerEntry>>;

    /// Loads every deposit still `pending`, newest first.
    fn list_pending_deposits(&self) -> StoreFuture<'_, Vec<LedgerEntry>>;

    /// Finds a `pending` deposit and transitions it to `completed`,
    /// crediting the balance and `total_deposited` in the same step.
    fn complete_pending_deposit(
        &self,
        locator: EntryLocator,
        payment_ref: Option<String>,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition>;

    /// Transitions a `pending` deposit to `rejected`.
    fn reject_pending_deposit(
        &self,
        id: EntryId,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition>;

    // ── Charge holds ─────────────────────────────────────────────────────

    /// Removes the hold and appends its settlement entry in one step. The
    /// entry's amount is overwritten with the held amount.
    fn settle_hold(&self, id: JoinId, entry: LedgerEntry) -> StoreFuture<'_, HoldOutcome>;

    /// Removes the hold and credits its amount back in one step.
    fn release_hold(&self, id: JoinId) -> StoreFuture<'_, HoldOutcome>;

    /// Loads holds created strictly before `cutoff`.
    fn list_holds(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<ChargeHold>>;

    // ── Matches ──────────────────────────────────────────────────────────

    /// Inserts a new match.
    fn insert_match(&self, m: Match) -> StoreFuture<'_, ()>;

    /// Loads a match with its roster.
    fn get_match(&self, id: MatchId) -> StoreFuture<'_, Option<Match>>;

    /// Loads matches passing `filter`, ordered by scheduled time.
    fn list_matches(&self, filter: MatchFilter) -> StoreFuture<'_, Vec<Match>>;

    /// Applies an admin patch, checking roster constraints atomically.
    fn update_match(&self, id: MatchId, patch: MatchPatch) -> StoreFuture<'_, UpdateOutcome>;

    /// Checks `status == upcoming`, no duplicate, and `|roster| < capacity`,
    /// then appends `participant`, all as one step.
    fn reserve_seat(&self, id: MatchId, participant: Participant)
    -> StoreFuture<'_, ReserveOutcome>;

    /// Removes an account's seat. With `seat` set, only that exact seat is
    /// removed.
    fn release_seat(
        &self,
        id: MatchId,
        account_id: AccountId,
        seat: Option<JoinId>,
    ) -> StoreFuture<'_, ReleaseOutcome>;

    /// Empties the roster, returning the pre-release snapshot in join order.
    fn release_all_seats(&self, id: MatchId) -> StoreFuture<'_, Option<Vec<Participant>>>;

    /// Moves the match to `next` if the lifecycle allows it.
    fn transition_status(&self, id: MatchId, next: MatchStatus)
    -> StoreFuture<'_, TransitionOutcome>;

    /// Removes a match. Returns `false` if it did not exist.
    fn delete_match(&self, id: MatchId) -> StoreFuture<'_, bool>;
}

/// Returns the entry-status change a deposit completion writes.
pub(crate) fn completed_deposit(
    mut entry: LedgerEntry,
    payment_ref: Option<String>,
    admin_notes: Option<String>,
) -> LedgerEntry {
    entry.status = EntryStatus::Completed;
    if payment_ref.is_some() {
        entry.payment_ref = payment_ref;
    }
    if admin_notes.is_some() {
        entry.admin_notes = admin_notes;
    }
    entry.updated_at = Utc::now();
    entry
}
