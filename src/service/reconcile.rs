//! Reconciliation sweep: resolves charge holds left behind by interrupted
//! joins and finishes interrupted cancellation refunds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::domain::{MatchStatus, RefundReason};
use crate::error::GatewayError;
use crate::persistence::{HoldOutcome, LedgerStore, MatchFilter, ReadRetry};
use crate::service::RefundCoordinator;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct SweepReport {
    /// Holds settled because their seat exists.
    pub settled: usize,
    /// Holds released because their seat does not exist.
    pub released: usize,
    /// Refunds applied to cancelled matches.
    pub refunds_applied: usize,
}

/// Periodic invariant repair.
#[derive(Debug)]
pub struct ReconciliationSweep {
    store: Arc<dyn LedgerStore>,
    refunds: Arc<RefundCoordinator>,
    retry: ReadRetry,
    grace: Duration,
}

impl ReconciliationSweep {
    /// Creates a sweep that leaves holds younger than `grace` alone.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        refunds: Arc<RefundCoordinator>,
        retry: ReadRetry,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            refunds,
            retry,
            grace,
        }
    }

    /// Runs one pass.
    ///
    /// A hold whose join id is seated in its match is settled into the
    /// entry fee; any other hold is released back to the wallet. Cancelled
    /// matches with a fee get their roster refunded again, which only
    /// credits seats not yet refunded.
    ///
    /// # Errors
    ///
    /// Persistence failures. Work done before the failure stays done.
    pub async fn run_once(&self) -> Result<SweepReport, GatewayError> {
        let mut report = SweepReport::default();
        let grace = chrono::Duration::from_std(self.grace).unwrap_or(chrono::Duration::zero());
        let cutoff = Utc::now() - grace;

        let holds = self
            .retry
            .run("list_holds", || self.store.list_holds(cutoff))
            .await?;
        for hold in holds {
            let m = self
                .retry
                .run("get_match", || self.store.get_match(hold.match_id))
                .await?;
            let seated = m
                .as_ref()
                .is_some_and(|m| m.roster.iter().any(|p| p.seat == hold.id));
            let outcome = if let (true, Some(m)) = (seated, &m) {
                self.store
                    .settle_hold(hold.id, hold.settlement_entry(&m.spec.title))
                    .await?
            } else {
                self.store.release_hold(hold.id).await?
            };
            match outcome {
                HoldOutcome::Settled { amount } => {
                    tracing::info!(join = %hold.id, account_id = %hold.account_id, match_id = %hold.match_id, amount, "stale hold settled");
                    report.settled += 1;
                }
                HoldOutcome::Released { new_balance } => {
                    tracing::info!(join = %hold.id, account_id = %hold.account_id, match_id = %hold.match_id, amount = hold.amount, new_balance, "stale hold released");
                    report.released += 1;
                }
                HoldOutcome::HoldMissing => {}
            }
        }

        let cancelled = self
            .retry
            .run("list_matches", || {
                self.store
                    .list_matches(MatchFilter::with_statuses(&[MatchStatus::Cancelled]))
            })
            .await?;
        for m in &cancelled {
            let refund = self
                .refunds
                .refund_roster(m.id, &m.spec.title, &m.roster, RefundReason::MatchCancelled)
                .await?;
            report.refunds_applied += refund.refunded;
        }

        if report != SweepReport::default() {
            tracing::info!(
                settled = report.settled,
                released = report.released,
                refunds_applied = report.refunds_applied,
                "reconciliation sweep repaired state"
            );
        }
        Ok(report)
    }

    /// Runs the sweep every `interval` on a background task.
    #[must_use]
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "reconciliation sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::match_entry::tests::spec;
    use crate::domain::{
        Account, AccountId, ChargeHold, EntryKind, IdempotencyKey, Match, Participant,
    };
    use crate::persistence::{DebitRecord, EntryLocator, MemoryLedgerStore};

    struct Fixture {
        store: Arc<MemoryLedgerStore>,
        sweep: ReconciliationSweep,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLedgerStore::new());
        let dyn_store: Arc<dyn LedgerStore> = Arc::clone(&store) as Arc<dyn LedgerStore>;
        let refunds = Arc::new(RefundCoordinator::new(
            Arc::clone(&dyn_store),
            ReadRetry::none(),
        ));
        let sweep = ReconciliationSweep::new(dyn_store, refunds, ReadRetry::none(), Duration::ZERO);
        Fixture { store, sweep }
    }

    async fn charged(store: &MemoryLedgerStore, m: &Match, balance: u64) -> ChargeHold {
        let account = Account::new(AccountId::new(), "ace").with_balance(balance);
        let id = account.id;
        let Ok(true) = store.insert_account(account).await else {
            panic!("insert failed");
        };
        let hold = ChargeHold::new(id, m.id, m.spec.entry_fee);
        let Ok(_) = store
            .debit_if_sufficient(id, m.spec.entry_fee, DebitRecord::Hold(hold.clone()))
            .await
        else {
            panic!("debit failed");
        };
        hold
    }

    async fn balance(store: &MemoryLedgerStore, id: AccountId) -> u64 {
        let Ok(Some(account)) = store.get_account(id).await else {
            panic!("account missing");
        };
        account.balance
    }

    #[tokio::test]
    async fn seated_hold_is_settled_and_orphan_released() {
        let f = fixture();
        let m = Match::new(spec(20, 4), None);
        let Ok(()) = f.store.insert_match(m.clone()).await else {
            panic!("insert failed");
        };

        let seated = charged(&f.store, &m, 50).await;
        let Ok(_) = f
            .store
            .reserve_seat(m.id, Participant::new(seated.account_id, "ace", seated.id))
            .await
        else {
            panic!("reserve failed");
        };
        let orphan = charged(&f.store, &m, 50).await;

        let Ok(report) = f.sweep.run_once().await else {
            panic!("sweep failed");
        };
        assert_eq!(report.settled, 1);
        assert_eq!(report.released, 1);

        assert_eq!(balance(&f.store, seated.account_id).await, 30);
        assert_eq!(balance(&f.store, orphan.account_id).await, 50);
        let Ok(Some(fee)) = f
            .store
            .find_entry(EntryLocator::IdempotencyKey(IdempotencyKey::entry_fee(
                seated.id,
            )))
            .await
        else {
            panic!("entry fee missing");
        };
        assert_eq!(fee.kind, EntryKind::EntryFee);

        let Ok(again) = f.sweep.run_once().await else {
            panic!("sweep failed");
        };
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn hold_for_deleted_match_is_released() {
        let f = fixture();
        let m = Match::new(spec(20, 4), None);
        let hold = charged(&f.store, &m, 20).await;
        let Ok(report) = f.sweep.run_once().await else {
            panic!("sweep failed");
        };
        assert_eq!(report.released, 1);
        assert_eq!(balance(&f.store, hold.account_id).await, 20);
    }

    #[tokio::test]
    async fn interrupted_cancellation_is_finished() {
        let f = fixture();
        let m = Match::new(spec(15, 4), None);
        let Ok(()) = f.store.insert_match(m.clone()).await else {
            panic!("insert failed");
        };
        let mut accounts = Vec::new();
        for _ in 0..3 {
            let hold = charged(&f.store, &m, 15).await;
            let Ok(HoldOutcome::Settled { .. }) = f
                .store
                .settle_hold(hold.id, hold.settlement_entry(&m.spec.title))
                .await
            else {
                panic!("settle failed");
            };
            let Ok(_) = f
                .store
                .reserve_seat(m.id, Participant::new(hold.account_id, "p", hold.id))
                .await
            else {
                panic!("reserve failed");
            };
            accounts.push(hold.account_id);
        }
        // cancelled, but the process died before any refund
        let Ok(_) = f
            .store
            .transition_status(m.id, MatchStatus::Cancelled)
            .await
        else {
            panic!("transition failed");
        };

        let Ok(report) = f.sweep.run_once().await else {
            panic!("sweep failed");
        };
        assert_eq!(report.refunds_applied, 3);
        for id in &accounts {
            assert_eq!(balance(&f.store, *id).await, 15);
        }
        let Ok(again) = f.sweep.run_once().await else {
            panic!("sweep failed");
        };
        assert_eq!(again.refunds_applied, 0);
    }

    #[tokio::test]
    async fn young_holds_are_left_alone() {
        let store = Arc::new(MemoryLedgerStore::new());
        let dyn_store: Arc<dyn LedgerStore> = Arc::clone(&store) as Arc<dyn LedgerStore>;
        let refunds = Arc::new(RefundCoordinator::new(
            Arc::clone(&dyn_store),
            ReadRetry::none(),
        ));
        let sweep = ReconciliationSweep::new(
            dyn_store,
            refunds,
            ReadRetry::none(),
            Duration::from_secs(3600),
        );
        let m = Match::new(spec(20, 4), None);
        let hold = charged(&store, &m, 20).await;
        let Ok(report) = sweep.run_once().await else {
            panic!("sweep failed");
        };
        assert_eq!(report, SweepReport::default());
        assert_eq!(balance(&store, hold.account_id).await, 0);
    }
}
