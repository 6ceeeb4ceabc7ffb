//! Fault-injecting store wrapper for coordinator tests.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{
    AppendOutcome, CreditOutcome, DebitOutcome, DebitRecord, DeleteAccountOutcome,
    DepositTransition, EntryLocator, HoldOutcome, LedgerStore, MatchFilter, MatchPatch,
    MemoryLedgerStore, PlainCreditOutcome, ReleaseOutcome, ReserveOutcome, StoreError, StoreFuture, TransitionOutcome,
    UpdateOutcome,
};
use crate::domain::{
    Account, AccountId, ChargeHold, EntryId, JoinId, LedgerEntry, Match, MatchId, MatchStatus,
    Participant,
};

/// How `reserve_seat` misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ReserveFault {
    None = 0,
    /// Hang before touching the roster.
    StallBefore = 1,
    /// Commit the seat, then hang.
    StallAfter = 2,
    /// Commit the seat, then report a lost connection.
    FailAfter = 3,
    /// Refuse as if full without looking at the roster.
    Refuse = 4,
    /// Report a lost connection and take the read path down with it.
    FailBlind = 5,
    /// Pause briefly, then reserve normally.
    Delay = 6,
}

const STALL: Duration = Duration::from_secs(30);
const DELAY: Duration = Duration::from_millis(300);

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

/// [`MemoryLedgerStore`] with switchable failures.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    pub(crate) inner: MemoryLedgerStore,
    reserve: AtomicU8,
    fail_settle: AtomicBool,
    fail_release_hold: AtomicBool,
    fail_reads: AtomicBool,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reserve_fault(&self, fault: ReserveFault) {
        self.reserve.store(fault as u8, Ordering::SeqCst);
    }

    pub(crate) fn fail_settle(&self, on: bool) {
        self.fail_settle.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_release_hold(&self, on: bool) {
        self.fail_release_hold.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    fn reads_down(&self) -> bool {
        self.fail_reads.load(Ordering::SeqCst)
    }
}

impl LedgerStore for FaultyStore {
    fn insert_account(&self, account: Account) -> StoreFuture<'_, bool> {
        self.inner.insert_account(account)
    }

    fn get_account(&self, id: AccountId) -> StoreFuture<'_, Option<Account>> {
        self.inner.get_account(id)
    }

    fn list_accounts(&self) -> StoreFuture<'_, Vec<Account>> {
        self.inner.list_accounts()
    }

    fn delete_account(&self, id: AccountId) -> StoreFuture<'_, DeleteAccountOutcome> {
        self.inner.delete_account(id)
    }

    fn debit_if_sufficient(
        &self,
        id: AccountId,
        amount: u64,
        record: DebitRecord,
    ) -> StoreFuture<'_, DebitOutcome> {
        self.inner.debit_if_sufficient(id, amount, record)
    }

    fn credit(&self, id: AccountId, amount: u64) -> StoreFuture<'_, PlainCreditOutcome> {
        self.inner.credit(id, amount)
    }

    fn credit_with_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, CreditOutcome> {
        self.inner.credit_with_entry(entry)
    }

    fn set_balance(&self, id: AccountId, balance: u64) -> StoreFuture<'_, Option<u64>> {
        self.inner.set_balance(id, balance)
    }

    fn append_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, AppendOutcome> {
        self.inner.append_entry(entry)
    }

    fn find_entry(&self, locator: EntryLocator) -> StoreFuture<'_, Option<LedgerEntry>> {
        if self.reads_down() {
            return Box::pin(async { Err(unavailable()) });
        }
        self.inner.find_entry(locator)
    }

    fn list_entries(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<LedgerEntry>> {
        self.inner.list_entries(account_id, limit)
    }

    fn list_pending_deposits(&self) -> StoreFuture<'_, Vec<LedgerEntry>> {
        self.inner.list_pending_deposits()
    }

    fn complete_pending_deposit(
        &self,
        locator: EntryLocator,
        payment_ref: Option<String>,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition> {
        self.inner
            .complete_pending_deposit(locator, payment_ref, admin_notes)
    }

    fn reject_pending_deposit(
        &self,
        id: EntryId,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition> {
        self.inner.reject_pending_deposit(id, admin_notes)
    }

    fn settle_hold(&self, id: JoinId, entry: LedgerEntry) -> StoreFuture<'_, HoldOutcome> {
        if self.fail_settle.load(Ordering::SeqCst) {
            return Box::pin(async { Err(unavailable()) });
        }
        self.inner.settle_hold(id, entry)
    }

    fn release_hold(&self, id: JoinId) -> StoreFuture<'_, HoldOutcome> {
        if self.fail_release_hold.load(Ordering::SeqCst) {
            return Box::pin(async { Err(unavailable()) });
        }
        self.inner.release_hold(id)
    }

    fn list_holds(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<ChargeHold>> {
        self.inner.list_holds(cutoff)
    }

    fn insert_match(&self, m: Match) -> StoreFuture<'_, ()> {
        self.inner.insert_match(m)
    }

    fn get_match(&self, id: MatchId) -> StoreFuture<'_, Option<Match>> {
        if self.reads_down() {
            return Box::pin(async { Err(unavailable()) });
        }
        self.inner.get_match(id)
    }

    fn list_matches(&self, filter: MatchFilter) -> StoreFuture<'_, Vec<Match>> {
        self.inner.list_matches(filter)
    }

    fn update_match(&self, id: MatchId, patch: MatchPatch) -> StoreFuture<'_, UpdateOutcome> {
        self.inner.update_match(id, patch)
    }

    fn reserve_seat(
        &self,
        id: MatchId,
        participant: Participant,
    ) -> StoreFuture<'_, ReserveOutcome> {
        let fault = self.reserve.load(Ordering::SeqCst);
        Box::pin(async move {
            if fault == ReserveFault::Refuse as u8 {
                return Ok(ReserveOutcome::MatchFull);
            }
            if fault == ReserveFault::FailBlind as u8 {
                self.fail_reads.store(true, Ordering::SeqCst);
                return Err(unavailable());
            }
            if fault == ReserveFault::StallBefore as u8 {
                tokio::time::sleep(STALL).await;
            }
            if fault == ReserveFault::Delay as u8 {
                tokio::time::sleep(DELAY).await;
            }
            let outcome = self.inner.reserve_seat(id, participant).await?;
            if fault == ReserveFault::StallAfter as u8 {
                tokio::time::sleep(STALL).await;
            }
            if fault == ReserveFault::FailAfter as u8 {
                return Err(unavailable());
            }
            Ok(outcome)
        })
    }

    fn release_seat(
        &self,
        id: MatchId,
        account_id: AccountId,
        seat: Option<JoinId>,
    ) -> StoreFuture<'_, ReleaseOutcome> {
        self.inner.release_seat(id, account_id, seat)
    }

    fn release_all_seats(&self, id: MatchId) -> StoreFuture<'_, Option<Vec<Participant>>> {
        self.inner.release_all_seats(id)
    }

    fn transition_status(
        &self,
        id: MatchId,
        next: MatchStatus,
    ) -> StoreFuture<'_, TransitionOutcome> {
        self.inner.transition_status(id, next)
    }

    fn delete_match(&self, id: MatchId) -> StoreFuture<'_, bool> {
        self.inner.delete_match(id)
    }
}
