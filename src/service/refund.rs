//! Refund coordinator: per-seat compensating credits.
//!
//! Each refund is one `credit_with_entry` keyed by
//! [`IdempotencyKey::refund`], so a refund is applied at most once per
//! `(match, participant)` seat however many times the roster is replayed.
//! A seat is refunded what it was charged: the amount of its settled
//! `entry_fee:{join}` entry, never the match's current fee. Any unresolved
//! charge hold for the seat is settled first; a seat whose hold turns out
//! to have been released, or that joined for free, was never charged and
//! is skipped.

use std::sync::Arc;

use crate::domain::{
    ChargeHold, EntryKind, EntryStatus, IdempotencyKey, LedgerEntry, MatchId, Participant,
    RefundReason,
};
use crate::error::GatewayError;
use crate::persistence::{CreditOutcome, EntryLocator, HoldOutcome, LedgerStore, ReadRetry};

/// Counts produced by one [`RefundCoordinator::refund_roster`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefundReport {
    /// Seats credited by this call.
    pub refunded: usize,
    /// Seats already refunded by an earlier call.
    pub already_refunded: usize,
    /// Seats with no entry fee on record: released charges and free joins.
    pub unpaid: usize,
    /// Seats whose account no longer exists.
    pub missing_accounts: usize,
}

impl RefundReport {
    /// Total number of seats processed.
    #[must_use]
    pub const fn seats(&self) -> usize {
        self.refunded + self.already_refunded + self.unpaid + self.missing_accounts
    }
}

/// Bulk compensating credits for cancelled, deleted or removed seats.
#[derive(Debug)]
pub struct RefundCoordinator {
    store: Arc<dyn LedgerStore>,
    retry: ReadRetry,
}

impl RefundCoordinator {
    /// Creates a refund coordinator.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, retry: ReadRetry) -> Self {
        Self { store, retry }
    }

    /// Refunds every participant in `roster` the entry fee it paid.
    ///
    /// Safe to call repeatedly with the same roster: already refunded seats
    /// are counted in [`RefundReport::already_refunded`] and left alone.
    ///
    /// # Errors
    ///
    /// Returns the first persistence failure. Seats processed before it
    /// stay refunded; calling again finishes the rest.
    pub async fn refund_roster(
        &self,
        match_id: MatchId,
        match_title: &str,
        roster: &[Participant],
        reason: RefundReason,
    ) -> Result<RefundReport, GatewayError> {
        let mut report = RefundReport::default();

        for participant in roster {
            let Some(paid) = self
                .entry_fee_paid(match_id, match_title, participant)
                .await?
                .filter(|paid| *paid > 0)
            else {
                report.unpaid += 1;
                continue;
            };

            let key = IdempotencyKey::refund(match_id, participant.account_id, participant.seat);
            let entry = LedgerEntry::new(
                participant.account_id,
                EntryKind::Refund,
                paid,
                EntryStatus::Completed,
            )
            .with_match(match_id)
            .with_idempotency_key(key)
            .with_description(reason.describe(match_title));

            match self.store.credit_with_entry(entry).await? {
                CreditOutcome::Applied { new_balance } => {
                    tracing::info!(
                        %match_id,
                        account_id = %participant.account_id,
                        amount = paid,
                        new_balance,
                        reason = reason.as_str(),
                        "participant refunded"
                    );
                    report.refunded += 1;
                }
                CreditOutcome::AlreadyApplied => report.already_refunded += 1,
                CreditOutcome::AccountNotFound => {
                    tracing::warn!(
                        %match_id,
                        account_id = %participant.account_id,
                        "refund skipped, account no longer exists"
                    );
                    report.missing_accounts += 1;
                }
            }
        }

        tracing::info!(
            %match_id,
            reason = reason.as_str(),
            refunded = report.refunded,
            already_refunded = report.already_refunded,
            unpaid = report.unpaid,
            "roster refund finished"
        );
        Ok(report)
    }

    /// Resolves the seat's charge and returns the amount it paid: settles
    /// an open hold, or reads the settled entry fee.
    async fn entry_fee_paid(
        &self,
        match_id: MatchId,
        match_title: &str,
        participant: &Participant,
    ) -> Result<Option<u64>, GatewayError> {
        // the store records the held amount, not this placeholder
        let hold = ChargeHold {
            id: participant.seat,
            account_id: participant.account_id,
            match_id,
            amount: 0,
            created_at: participant.joined_at,
        };
        match self
            .store
            .settle_hold(hold.id, hold.settlement_entry(match_title))
            .await?
        {
            HoldOutcome::Settled { amount } => Ok(Some(amount)),
            HoldOutcome::HoldMissing | HoldOutcome::Released { .. } => {
                let key = IdempotencyKey::entry_fee(participant.seat);
                let settled = self
                    .retry
                    .run("find_entry_fee", || {
                        self.store
                            .find_entry(EntryLocator::IdempotencyKey(key.clone()))
                    })
                    .await?;
                Ok(settled.map(|entry| entry.amount))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::domain::{Account, AccountId, JoinId};
    use crate::persistence::{DebitRecord, MemoryLedgerStore};

    /// Seats `n` accounts that each paid `fee` with a settled entry fee.
    async fn paid_roster(
        store: &MemoryLedgerStore,
        match_id: MatchId,
        n: usize,
        fee: u64,
    ) -> Vec<Participant> {
        let mut roster = Vec::new();
        for i in 0..n {
            let account = Account::new(AccountId::new(), format!("p{i}")).with_balance(fee);
            let id = account.id;
            let Ok(true) = store.insert_account(account).await else {
                panic!("insert failed");
            };
            let hold = ChargeHold::new(id, match_id, fee);
            let Ok(_) = store
                .debit_if_sufficient(id, fee, DebitRecord::Hold(hold.clone()))
                .await
            else {
                panic!("debit failed");
            };
            let Ok(HoldOutcome::Settled { .. }) = store
                .settle_hold(hold.id, hold.settlement_entry("Miramar Solo"))
                .await
            else {
                panic!("settle failed");
            };
            roster.push(Participant::new(id, format!("p{i}"), hold.id));
        }
        roster
    }

    async fn balance(store: &MemoryLedgerStore, id: AccountId) -> u64 {
        let Ok(Some(account)) = store.get_account(id).await else {
            panic!("account missing");
        };
        account.balance
    }

    #[tokio::test]
    async fn refunds_each_seat_exactly_once() {
        let store = Arc::new(MemoryLedgerStore::new());
        let match_id = MatchId::new();
        let roster = paid_roster(&store, match_id, 7, 50).await;
        let coordinator = RefundCoordinator::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            ReadRetry::none(),
        );

        let Ok(first) = coordinator
            .refund_roster(match_id, "Miramar Solo", &roster, RefundReason::MatchCancelled)
            .await
        else {
            panic!("refund failed");
        };
        assert_eq!(first.refunded, 7);

        let mut keys = HashSet::new();
        for p in &roster {
            assert_eq!(balance(&store, p.account_id).await, 50);
            let Ok(entries) = store.list_entries(p.account_id, 10).await else {
                panic!("history failed");
            };
            let refunds: Vec<_> = entries
                .iter()
                .filter(|e| e.kind == EntryKind::Refund)
                .collect();
            assert_eq!(refunds.len(), 1);
            if let Some(key) = refunds.first().and_then(|e| e.idempotency_key.clone()) {
                keys.insert(key);
            }
        }
        assert_eq!(keys.len(), 7);

        let Ok(second) = coordinator
            .refund_roster(match_id, "Miramar Solo", &roster, RefundReason::MatchCancelled)
            .await
        else {
            panic!("rerun failed");
        };
        assert_eq!(second.refunded, 0);
        assert_eq!(second.already_refunded, 7);
        for p in &roster {
            assert_eq!(balance(&store, p.account_id).await, 50);
        }
    }

    #[tokio::test]
    async fn open_hold_is_settled_before_refund() {
        let store = Arc::new(MemoryLedgerStore::new());
        let match_id = MatchId::new();
        let account = Account::new(AccountId::new(), "ace").with_balance(20);
        let id = account.id;
        let Ok(true) = store.insert_account(account).await else {
            panic!("insert failed");
        };
        let hold = ChargeHold::new(id, match_id, 20);
        let Ok(_) = store
            .debit_if_sufficient(id, 20, DebitRecord::Hold(hold.clone()))
            .await
        else {
            panic!("debit failed");
        };
        let roster = vec![Participant::new(id, "ace", hold.id)];

        let coordinator = RefundCoordinator::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            ReadRetry::none(),
        );
        let Ok(report) = coordinator
            .refund_roster(match_id, "Sanhok", &roster, RefundReason::ParticipantRemoved)
            .await
        else {
            panic!("refund failed");
        };
        assert_eq!(report.refunded, 1);
        assert_eq!(balance(&store, id).await, 20);

        // the hold is gone, so a late release cannot credit a second time
        let Ok(HoldOutcome::HoldMissing) = store.release_hold(hold.id).await else {
            panic!("hold should already be resolved");
        };
        assert_eq!(balance(&store, id).await, 20);
    }

    #[tokio::test]
    async fn released_charge_is_not_refunded() {
        let store = Arc::new(MemoryLedgerStore::new());
        let match_id = MatchId::new();
        let account = Account::new(AccountId::new(), "ace").with_balance(20);
        let id = account.id;
        let Ok(true) = store.insert_account(account).await else {
            panic!("insert failed");
        };
        let hold = ChargeHold::new(id, match_id, 20);
        let Ok(_) = store
            .debit_if_sufficient(id, 20, DebitRecord::Hold(hold.clone()))
            .await
        else {
            panic!("debit failed");
        };
        let Ok(HoldOutcome::Released { new_balance: 20 }) = store.release_hold(hold.id).await
        else {
            panic!("release failed");
        };

        let coordinator = RefundCoordinator::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            ReadRetry::none(),
        );
        let roster = vec![Participant::new(id, "ace", hold.id)];
        let Ok(report) = coordinator
            .refund_roster(match_id, "Sanhok", &roster, RefundReason::MatchDeleted)
            .await
        else {
            panic!("refund failed");
        };
        assert_eq!(report.unpaid, 1);
        assert_eq!(balance(&store, id).await, 20);
    }

    #[tokio::test]
    async fn free_seats_refund_nothing() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let coordinator = RefundCoordinator::new(store, ReadRetry::none());
        let roster = vec![Participant::new(AccountId::new(), "ace", JoinId::new())];
        let Ok(report) = coordinator
            .refund_roster(MatchId::new(), "Free", &roster, RefundReason::MatchCancelled)
            .await
        else {
            panic!("refund failed");
        };
        assert_eq!(report.refunded, 0);
        assert_eq!(report.unpaid, 1);
    }

    #[tokio::test]
    async fn refund_matches_amount_charged_not_current_fee() {
        let store = Arc::new(MemoryLedgerStore::new());
        let match_id = MatchId::new();
        // one seat settled at 20, one still holding 35
        let settled = paid_roster(&store, match_id, 1, 20).await;
        let account = Account::new(AccountId::new(), "late").with_balance(35);
        let late = account.id;
        let Ok(true) = store.insert_account(account).await else {
            panic!("insert failed");
        };
        let hold = ChargeHold::new(late, match_id, 35);
        let Ok(_) = store
            .debit_if_sufficient(late, 35, DebitRecord::Hold(hold.clone()))
            .await
        else {
            panic!("debit failed");
        };
        let mut roster = settled.clone();
        roster.push(Participant::new(late, "late", hold.id));

        let coordinator = RefundCoordinator::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            ReadRetry::none(),
        );
        let Ok(report) = coordinator
            .refund_roster(match_id, "Vikendi", &roster, RefundReason::MatchCancelled)
            .await
        else {
            panic!("refund failed");
        };
        assert_eq!(report.refunded, 2);
        assert_eq!(balance(&store, settled[0].account_id).await, 20);
        assert_eq!(balance(&store, late).await, 35);

        let Ok(Some(fee)) = store
            .find_entry(EntryLocator::IdempotencyKey(IdempotencyKey::entry_fee(hold.id)))
            .await
        else {
            panic!("entry fee missing");
        };
        assert_eq!(fee.amount, 35);
    }
}
