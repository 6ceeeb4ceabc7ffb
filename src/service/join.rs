//! Join coordinator: entry-fee charge plus seat reservation as one
//! logical operation.
//!
//! The flow is debit → reserve → settle:
//!
//! 1. the fee is debited together with a [`ChargeHold`] keyed by a fresh
//!    [`JoinId`], which also becomes the participant's seat id;
//! 2. the seat is reserved under a timeout;
//! 3. the hold is settled into a completed `entry_fee` entry.
//!
//! A definite reservation failure releases the hold, which credits the
//! fee back. An ambiguous one (store error or timeout) is resolved by
//! reading the roster: if the seat landed the join goes on, otherwise the
//! hold is released. If compensation itself cannot complete, the caller
//! gets [`GatewayError::ReconciliationPending`] and the hold is left for
//! the reconciliation sweep, which settles or releases it from the roster.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{
    AccountId, ChargeHold, EventBus, JoinId, MatchEvent, MatchId, MatchStatus, Participant,
};
use crate::error::GatewayError;
use crate::persistence::{DebitRecord, HoldOutcome};
use crate::service::{MatchCapacityEngine, WalletEngine};

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinReceipt {
    /// Wallet balance after the entry fee.
    pub balance: u64,
    /// Roster size after the join.
    pub participant_count: usize,
}

/// Orchestrates the wallet and capacity engines for `join_match`.
#[derive(Debug)]
pub struct JoinCoordinator {
    wallet: Arc<WalletEngine>,
    capacity: Arc<MatchCapacityEngine>,
    event_bus: EventBus,
    step_timeout: Duration,
}

impl JoinCoordinator {
    /// Creates a join coordinator.
    #[must_use]
    pub fn new(
        wallet: Arc<WalletEngine>,
        capacity: Arc<MatchCapacityEngine>,
        event_bus: EventBus,
        step_timeout: Duration,
    ) -> Self {
        Self {
            wallet,
            capacity,
            event_bus,
            step_timeout,
        }
    }

    /// Charges the entry fee and seats the account.
    ///
    /// On any error other than [`GatewayError::ReconciliationPending`] the
    /// account's balance is what it was before the call.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InsufficientFunds`], [`GatewayError::MatchFull`],
    /// [`GatewayError::AlreadyJoined`], [`GatewayError::MatchNotOpen`],
    /// [`GatewayError::JoinExpired`], not-found errors, persistence
    /// failures, or [`GatewayError::ReconciliationPending`].
    pub async fn join_match(
        &self,
        match_id: MatchId,
        account_id: AccountId,
        display_name: Option<String>,
    ) -> Result<JoinReceipt, GatewayError> {
        // Advisory: the reservation below is authoritative.
        let m = self.capacity.get_match(match_id).await?;
        if m.status != MatchStatus::Upcoming {
            return Err(GatewayError::MatchNotOpen);
        }
        if m.is_participant(account_id) {
            return Err(GatewayError::AlreadyJoined);
        }
        if m.is_full() {
            return Err(GatewayError::MatchFull);
        }

        let account = self.wallet.account(account_id).await?;
        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or(account.display_name);

        let fee = m.spec.entry_fee;
        let hold = ChargeHold::new(account_id, match_id, fee);
        let join = hold.id;
        let balance = if fee > 0 {
            self.wallet
                .debit_if_sufficient(account_id, fee, DebitRecord::Hold(hold.clone()))
                .await?
        } else {
            account.balance
        };

        let participant = Participant::new(account_id, display_name.clone(), join);
        let reserved = tokio::time::timeout(
            self.step_timeout,
            self.capacity.reserve_seat(match_id, participant),
        )
        .await;
        let participant_count = match reserved {
            Ok(Ok(count)) => count,
            Ok(Err(GatewayError::Persistence(e))) => {
                tracing::warn!(%match_id, %account_id, %join, error = %e, "seat reservation outcome unknown");
                self.resolve_ambiguous(match_id, account_id, join, fee, GatewayError::Persistence(e))
                    .await?
            }
            Ok(Err(e)) => {
                tracing::debug!(%match_id, %account_id, error = %e, "seat refused, releasing charge");
                self.compensate(match_id, account_id, join, fee).await?;
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(%match_id, %account_id, %join, timeout = ?self.step_timeout, "seat reservation timed out");
                self.resolve_ambiguous(match_id, account_id, join, fee, GatewayError::JoinExpired)
                    .await?
            }
        };

        if fee > 0 {
            self.settle(match_id, account_id, &hold, &m.spec.title)
                .await?;
        }

        self.event_bus.publish(MatchEvent::ParticipantJoined {
            match_id,
            account_id,
            display_name,
            participant_count,
            timestamp: Utc::now(),
        });
        tracing::info!(%match_id, %account_id, fee, balance, participant_count, "match joined");
        Ok(JoinReceipt {
            balance,
            participant_count,
        })
    }

    /// Decides a reservation whose outcome is unknown by reading the roster.
    /// Returns the roster size if the seat landed; otherwise compensates and
    /// returns `cause`.
    async fn resolve_ambiguous(
        &self,
        match_id: MatchId,
        account_id: AccountId,
        join: JoinId,
        fee: u64,
        cause: GatewayError,
    ) -> Result<usize, GatewayError> {
        let m = match self.capacity.get_match(match_id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(%match_id, %account_id, %join, error = %e, "cannot read roster, leaving charge to reconciliation");
                return Err(GatewayError::ReconciliationPending {
                    account_id,
                    match_id,
                });
            }
        };
        if m.roster.iter().any(|p| p.seat == join) {
            tracing::info!(%match_id, %account_id, %join, "seat found after ambiguous reservation");
            return Ok(m.participant_count());
        }
        self.compensate(match_id, account_id, join, fee).await?;
        Err(cause)
    }

    /// Releases the hold of an aborted join.
    async fn compensate(
        &self,
        match_id: MatchId,
        account_id: AccountId,
        join: JoinId,
        fee: u64,
    ) -> Result<(), GatewayError> {
        if fee == 0 {
            return Ok(());
        }
        match self.wallet.release_hold(join).await {
            Ok(HoldOutcome::Released { new_balance }) => {
                tracing::debug!(%match_id, %account_id, fee, new_balance, "entry fee released");
                Ok(())
            }
            Ok(HoldOutcome::HoldMissing | HoldOutcome::Settled { .. }) => Ok(()),
            Err(e) => {
                tracing::error!(%match_id, %account_id, %join, error = %e, "compensating credit failed");
                Err(GatewayError::ReconciliationPending {
                    account_id,
                    match_id,
                })
            }
        }
    }

    /// Turns the hold into the entry-fee entry.
    async fn settle(
        &self,
        match_id: MatchId,
        account_id: AccountId,
        hold: &ChargeHold,
        title: &str,
    ) -> Result<(), GatewayError> {
        match self
            .wallet
            .settle_hold(hold.id, hold.settlement_entry(title))
            .await
        {
            Ok(HoldOutcome::Settled { .. }) => Ok(()),
            Ok(HoldOutcome::HoldMissing | HoldOutcome::Released { .. }) => {
                // resolved by the sweep while we were seating
                match self.wallet.entry_fee_recorded(hold.id).await {
                    Ok(true) => Ok(()),
                    Ok(false) => self.unseat(match_id, account_id, hold.id).await,
                    Err(e) => {
                        tracing::error!(%match_id, %account_id, join = %hold.id, error = %e, "cannot confirm entry fee");
                        Err(GatewayError::ReconciliationPending {
                            account_id,
                            match_id,
                        })
                    }
                }
            }
            Err(e) => {
                // seat and debit both hold; the sweep settles from the roster
                tracing::warn!(%match_id, %account_id, join = %hold.id, error = %e, "entry fee settlement deferred");
                Ok(())
            }
        }
    }

    /// Gives the seat back after the charge was released underneath us.
    async fn unseat(
        &self,
        match_id: MatchId,
        account_id: AccountId,
        join: JoinId,
    ) -> Result<(), GatewayError> {
        match self
            .capacity
            .release_seat(match_id, account_id, Some(join))
            .await
        {
            Ok(_) | Err(GatewayError::NotAParticipant | GatewayError::MatchNotFound(_)) => {
                tracing::warn!(%match_id, %account_id, %join, "charge was released, seat withdrawn");
                Err(GatewayError::JoinExpired)
            }
            Err(e) => {
                tracing::error!(%match_id, %account_id, %join, error = %e, "cannot withdraw unpaid seat");
                Err(GatewayError::ReconciliationPending {
                    account_id,
                    match_id,
                })
            }
        }
    }
}
