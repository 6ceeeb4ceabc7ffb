//! In-memory ledger store.
//!
//! Accounts and matches live in `RwLock<HashMap<..>>` maps with each
//! aggregate behind its own [`tokio::sync::Mutex`], so operations on
//! different accounts or matches proceed concurrently while operations on
//! the same one are serialized. Global uniqueness (external references,
//! idempotency keys, hold ids) is tracked in a [`LedgerIndex`] that is
//! always locked before any account book.
//!
//! Each primitive performs its checks and writes inside one critical
//! section, which gives it the same all-or-nothing semantics the Postgres
//! store gets from a transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{
    AppendOutcome, CreditOutcome, DebitOutcome, DebitRecord, DeleteAccountOutcome,
    DepositTransition, EntryLocator, HoldOutcome, LedgerStore, MatchFilter, MatchPatch,
    PlainCreditOutcome, ReleaseOutcome, ReserveOutcome, StoreError, StoreFuture, TransitionOutcome, UpdateOutcome,
    completed_deposit,
};
use crate::domain::{
    Account, AccountId, ChargeHold, EntryId, EntryKind, EntryStatus, JoinId, LedgerEntry, Match,
    MatchId, MatchStatus, Participant,
};

/// One account with its ledger and open holds.
#[derive(Debug)]
struct AccountBook {
    account: Account,
    entries: Vec<LedgerEntry>,
    holds: HashMap<JoinId, ChargeHold>,
}

impl AccountBook {
    fn credit(&mut self, amount: u64) -> Result<u64, StoreError> {
        let balance = self
            .account
            .balance
            .checked_add(amount)
            .ok_or(StoreError::Overflow(self.account.id))?;
        self.account.balance = balance;
        self.account.updated_at = Utc::now();
        Ok(balance)
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut LedgerEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

/// Global uniqueness constraints and reverse lookups.
#[derive(Debug, Default)]
struct LedgerIndex {
    external_refs: HashMap<String, EntryId>,
    idempotency_keys: HashMap<String, EntryId>,
    entry_owner: HashMap<EntryId, AccountId>,
    hold_owner: HashMap<JoinId, AccountId>,
}

impl LedgerIndex {
    fn check(&self, entry: &LedgerEntry) -> Option<AppendOutcome> {
        if let Some(r) = &entry.external_ref
            && self.external_refs.contains_key(r)
        {
            return Some(AppendOutcome::DuplicateExternalReference);
        }
        if let Some(k) = &entry.idempotency_key
            && self.idempotency_keys.contains_key(k.as_str())
        {
            return Some(AppendOutcome::DuplicateIdempotencyKey);
        }
        None
    }

    fn record(&mut self, entry: &LedgerEntry) {
        if let Some(r) = &entry.external_ref {
            self.external_refs.insert(r.clone(), entry.id);
        }
        if let Some(k) = &entry.idempotency_key {
            self.idempotency_keys.insert(k.as_str().to_string(), entry.id);
        }
        self.entry_owner.insert(entry.id, entry.account_id);
    }

    fn forget(&mut self, entry: &LedgerEntry) {
        if let Some(r) = &entry.external_ref {
            self.external_refs.remove(r);
        }
        if let Some(k) = &entry.idempotency_key {
            self.idempotency_keys.remove(k.as_str());
        }
        self.entry_owner.remove(&entry.id);
    }
}

/// Process-local [`LedgerStore`] used for development and tests.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountBook>>>>,
    matches: RwLock<HashMap<MatchId, Arc<Mutex<Match>>>>,
    index: Mutex<LedgerIndex>,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn book(&self, id: AccountId) -> Option<Arc<Mutex<AccountBook>>> {
        self.accounts.read().await.get(&id).cloned()
    }

    async fn match_slot(&self, id: MatchId) -> Option<Arc<Mutex<Match>>> {
        self.matches.read().await.get(&id).cloned()
    }

    async fn locate(
        &self,
        index: &LedgerIndex,
        locator: &EntryLocator,
    ) -> Option<(EntryId, Arc<Mutex<AccountBook>>)> {
        let entry_id = match locator {
            EntryLocator::Id(id) => *id,
            EntryLocator::ExternalRef(r) => *index.external_refs.get(r)?,
            EntryLocator::IdempotencyKey(k) => *index.idempotency_keys.get(k.as_str())?,
        };
        let owner = *index.entry_owner.get(&entry_id)?;
        Some((entry_id, self.book(owner).await?))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn insert_account(&self, account: Account) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut map = self.accounts.write().await;
            if map.contains_key(&account.id) {
                return Ok(false);
            }
            map.insert(
                account.id,
                Arc::new(Mutex::new(AccountBook {
                    account,
                    entries: Vec::new(),
                    holds: HashMap::new(),
                })),
            );
            Ok(true)
        })
    }

    fn get_account(&self, id: AccountId) -> StoreFuture<'_, Option<Account>> {
        Box::pin(async move {
            let Some(book) = self.book(id).await else {
                return Ok(None);
            };
            let book = book.lock().await;
            Ok(Some(book.account.clone()))
        })
    }

    fn list_accounts(&self) -> StoreFuture<'_, Vec<Account>> {
        Box::pin(async move {
            let books: Vec<_> = self.accounts.read().await.values().cloned().collect();
            let mut accounts = Vec::with_capacity(books.len());
            for book in books {
                accounts.push(book.lock().await.account.clone());
            }
            accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(accounts)
        })
    }

    fn delete_account(&self, id: AccountId) -> StoreFuture<'_, DeleteAccountOutcome> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            let mut map = self.accounts.write().await;
            let Some(book) = map.get(&id).cloned() else {
                return Ok(DeleteAccountOutcome::NotFound);
            };
            let book = book.lock().await;
            if !book.holds.is_empty() {
                return Ok(DeleteAccountOutcome::HasOpenHolds);
            }
            for entry in &book.entries {
                index.forget(entry);
            }
            let entries_removed = book.entries.len();
            drop(book);
            map.remove(&id);
            Ok(DeleteAccountOutcome::Deleted { entries_removed })
        })
    }

    fn debit_if_sufficient(
        &self,
        id: AccountId,
        amount: u64,
        record: DebitRecord,
    ) -> StoreFuture<'_, DebitOutcome> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            let Some(book) = self.book(id).await else {
                return Ok(DebitOutcome::AccountNotFound);
            };
            let mut book = book.lock().await;

            let balance = book.account.balance;
            let Some(new_balance) = balance.checked_sub(amount) else {
                return Ok(DebitOutcome::InsufficientFunds { balance });
            };

            match record {
                DebitRecord::Hold(hold) => {
                    index.hold_owner.insert(hold.id, id);
                    book.holds.insert(hold.id, hold);
                }
                DebitRecord::Entry(entry) => {
                    if index.check(&entry).is_some() {
                        return Err(StoreError::Corrupt(format!(
                            "debit entry {} collides with an existing reference",
                            entry.id
                        )));
                    }
                    index.record(&entry);
                    book.entries.push(entry);
                }
            }
            book.account.balance = new_balance;
            book.account.updated_at = Utc::now();
            Ok(DebitOutcome::Applied { new_balance })
        })
    }

    fn credit(&self, id: AccountId, amount: u64) -> StoreFuture<'_, PlainCreditOutcome> {
        Box::pin(async move {
            let Some(book) = self.book(id).await else {
                return Ok(PlainCreditOutcome::AccountNotFound);
            };
            let new_balance = book.lock().await.credit(amount)?;
            Ok(PlainCreditOutcome::Applied { new_balance })
        })
    }

    fn credit_with_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, CreditOutcome> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            let Some(book) = self.book(entry.account_id).await else {
                return Ok(CreditOutcome::AccountNotFound);
            };
            if index.check(&entry).is_some() {
                return Ok(CreditOutcome::AlreadyApplied);
            }
            let mut book = book.lock().await;
            let new_balance = book.credit(entry.amount)?;
            if entry.kind == EntryKind::Winnings {
                book.account.total_winnings =
                    book.account.total_winnings.saturating_add(entry.amount);
            }
            index.record(&entry);
            book.entries.push(entry);
            Ok(CreditOutcome::Applied { new_balance })
        })
    }

    fn set_balance(&self, id: AccountId, balance: u64) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move {
            let Some(book) = self.book(id).await else {
                return Ok(None);
            };
            let mut book = book.lock().await;
            book.account.balance = balance;
            book.account.updated_at = Utc::now();
            Ok(Some(balance))
        })
    }

    fn append_entry(&self, entry: LedgerEntry) -> StoreFuture<'_, AppendOutcome> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            let Some(book) = self.book(entry.account_id).await else {
                return Ok(AppendOutcome::AccountNotFound);
            };
            if let Some(conflict) = index.check(&entry) {
                return Ok(conflict);
            }
            index.record(&entry);
            book.lock().await.entries.push(entry);
            Ok(AppendOutcome::Appended)
        })
    }

    fn find_entry(&self, locator: EntryLocator) -> StoreFuture<'_, Option<LedgerEntry>> {
        Box::pin(async move {
            let index = self.index.lock().await;
            let Some((entry_id, book)) = self.locate(&index, &locator).await else {
                return Ok(None);
            };
            let book = book.lock().await;
            Ok(book.entries.iter().find(|e| e.id == entry_id).cloned())
        })
    }

    fn list_entries(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            let Some(book) = self.book(account_id).await else {
                return Ok(Vec::new());
            };
            let book = book.lock().await;
            Ok(book.entries.iter().rev().take(limit).cloned().collect())
        })
    }

    fn list_pending_deposits(&self) -> StoreFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            let books: Vec<_> = self.accounts.read().await.values().cloned().collect();
            let mut pending = Vec::new();
            for book in books {
                let book = book.lock().await;
                pending.extend(
                    book.entries
                        .iter()
                        .filter(|e| {
                            e.kind == EntryKind::Deposit && e.status == EntryStatus::Pending
                        })
                        .cloned(),
                );
            }
            pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(pending)
        })
    }

    fn complete_pending_deposit(
        &self,
        locator: EntryLocator,
        payment_ref: Option<String>,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition> {
        Box::pin(async move {
            let index = self.index.lock().await;
            let Some((entry_id, book)) = self.locate(&index, &locator).await else {
                return Ok(DepositTransition::NotFound);
            };
            let mut book = book.lock().await;
            let Some(entry) = book.entries.iter().find(|e| e.id == entry_id).cloned() else {
                return Ok(DepositTransition::NotFound);
            };
            if entry.kind != EntryKind::Deposit {
                return Ok(DepositTransition::NotFound);
            }
            if entry.status != EntryStatus::Pending {
                return Ok(DepositTransition::NotPending { entry });
            }

            let new_balance = book.credit(entry.amount)?;
            book.account.total_deposited =
                book.account.total_deposited.saturating_add(entry.amount);
            let completed = completed_deposit(entry, payment_ref, admin_notes);
            if let Some(slot) = book.entry_mut(entry_id) {
                *slot = completed.clone();
            }
            Ok(DepositTransition::Completed {
                entry: completed,
                new_balance,
            })
        })
    }

    fn reject_pending_deposit(
        &self,
        id: EntryId,
        admin_notes: Option<String>,
    ) -> StoreFuture<'_, DepositTransition> {
        Box::pin(async move {
            let index = self.index.lock().await;
            let Some((entry_id, book)) = self.locate(&index, &EntryLocator::Id(id)).await else {
                return Ok(DepositTransition::NotFound);
            };
            let mut book = book.lock().await;
            let Some(slot) = book.entry_mut(entry_id) else {
                return Ok(DepositTransition::NotFound);
            };
            if slot.kind != EntryKind::Deposit {
                return Ok(DepositTransition::NotFound);
            }
            if slot.status != EntryStatus::Pending {
                return Ok(DepositTransition::NotPending {
                    entry: slot.clone(),
                });
            }
            slot.status = EntryStatus::Rejected;
            slot.admin_notes = admin_notes;
            slot.updated_at = Utc::now();
            Ok(DepositTransition::Rejected {
                entry: slot.clone(),
            })
        })
    }

    fn settle_hold(&self, id: JoinId, entry: LedgerEntry) -> StoreFuture<'_, HoldOutcome> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            let Some(owner) = index.hold_owner.get(&id).copied() else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let Some(book) = self.book(owner).await else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let mut book = book.lock().await;
            let Some(hold) = book.holds.remove(&id) else {
                return Ok(HoldOutcome::HoldMissing);
            };
            index.hold_owner.remove(&id);
            let mut entry = entry;
            entry.amount = hold.amount;
            index.record(&entry);
            book.entries.push(entry);
            Ok(HoldOutcome::Settled {
                amount: hold.amount,
            })
        })
    }

    fn release_hold(&self, id: JoinId) -> StoreFuture<'_, HoldOutcome> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            let Some(owner) = index.hold_owner.get(&id).copied() else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let Some(book) = self.book(owner).await else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let mut book = book.lock().await;
            let Some(hold) = book.holds.get(&id).cloned() else {
                return Ok(HoldOutcome::HoldMissing);
            };
            let new_balance = book.credit(hold.amount)?;
            book.holds.remove(&id);
            index.hold_owner.remove(&id);
            Ok(HoldOutcome::Released { new_balance })
        })
    }

    fn list_holds(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<ChargeHold>> {
        Box::pin(async move {
            let books: Vec<_> = self.accounts.read().await.values().cloned().collect();
            let mut holds = Vec::new();
            for book in books {
                let book = book.lock().await;
                holds.extend(
                    book.holds
                        .values()
                        .filter(|h| h.created_at < cutoff)
                        .cloned(),
                );
            }
            holds.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(holds)
        })
    }

    fn insert_match(&self, m: Match) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.matches
                .write()
                .await
                .insert(m.id, Arc::new(Mutex::new(m)));
            Ok(())
        })
    }

    fn get_match(&self, id: MatchId) -> StoreFuture<'_, Option<Match>> {
        Box::pin(async move {
            let Some(slot) = self.match_slot(id).await else {
                return Ok(None);
            };
            let m = slot.lock().await;
            Ok(Some(m.clone()))
        })
    }

    fn list_matches(&self, filter: MatchFilter) -> StoreFuture<'_, Vec<Match>> {
        Box::pin(async move {
            let slots: Vec<_> = self.matches.read().await.values().cloned().collect();
            let mut matches = Vec::with_capacity(slots.len());
            for slot in slots {
                let m = slot.lock().await;
                if filter.accepts(&m) {
                    matches.push(m.clone());
                }
            }
            matches.sort_by(|a, b| a.spec.scheduled_time.cmp(&b.spec.scheduled_time));
            Ok(matches)
        })
    }

    fn update_match(&self, id: MatchId, patch: MatchPatch) -> StoreFuture<'_, UpdateOutcome> {
        Box::pin(async move {
            let Some(slot) = self.match_slot(id).await else {
                return Ok(UpdateOutcome::NotFound);
            };
            let mut m = slot.lock().await;
            match patch.apply(&mut m) {
                Ok(()) => Ok(UpdateOutcome::Updated(Box::new(m.clone()))),
                Err(rejected) => Ok(rejected),
            }
        })
    }

    fn reserve_seat(
        &self,
        id: MatchId,
        participant: Participant,
    ) -> StoreFuture<'_, ReserveOutcome> {
        Box::pin(async move {
            let Some(slot) = self.match_slot(id).await else {
                return Ok(ReserveOutcome::MatchNotFound);
            };
            let mut m = slot.lock().await;
            if m.status != MatchStatus::Upcoming {
                return Ok(ReserveOutcome::MatchNotOpen);
            }
            if m.is_participant(participant.account_id) {
                return Ok(ReserveOutcome::AlreadyJoined);
            }
            if m.is_full() {
                return Ok(ReserveOutcome::MatchFull);
            }
            m.roster.push(participant);
            m.updated_at = Utc::now();
            Ok(ReserveOutcome::Reserved {
                participant_count: m.roster.len(),
            })
        })
    }

    fn release_seat(
        &self,
        id: MatchId,
        account_id: AccountId,
        seat: Option<JoinId>,
    ) -> StoreFuture<'_, ReleaseOutcome> {
        Box::pin(async move {
            let Some(slot) = self.match_slot(id).await else {
                return Ok(ReleaseOutcome::MatchNotFound);
            };
            let mut m = slot.lock().await;
            let Some(position) = m.roster.iter().position(|p| {
                p.account_id == account_id && seat.is_none_or(|s| p.seat == s)
            }) else {
                return Ok(ReleaseOutcome::NotAParticipant);
            };
            let participant = m.roster.remove(position);
            m.updated_at = Utc::now();
            Ok(ReleaseOutcome::Released {
                participant,
                participant_count: m.roster.len(),
            })
        })
    }

    fn release_all_seats(&self, id: MatchId) -> StoreFuture<'_, Option<Vec<Participant>>> {
        Box::pin(async move {
            let Some(slot) = self.match_slot(id).await else {
                return Ok(None);
            };
            let mut m = slot.lock().await;
            m.updated_at = Utc::now();
            Ok(Some(std::mem::take(&mut m.roster)))
        })
    }

    fn transition_status(
        &self,
        id: MatchId,
        next: MatchStatus,
    ) -> StoreFuture<'_, TransitionOutcome> {
        Box::pin(async move {
            let Some(slot) = self.match_slot(id).await else {
                return Ok(TransitionOutcome::NotFound);
            };
            let mut m = slot.lock().await;
            let previous = m.status;
            if !previous.can_transition_to(next) {
                return Ok(TransitionOutcome::Rejected { current: previous });
            }
            m.status = next;
            m.updated_at = Utc::now();
            Ok(TransitionOutcome::Changed {
                previous,
                current: Box::new(m.clone()),
            })
        })
    }

    fn delete_match(&self, id: MatchId) -> StoreFuture<'_, bool> {
        Box::pin(async move { Ok(self.matches.write().await.remove(&id).is_some()) })
    }
}
