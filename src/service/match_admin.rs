//! Match administration: lifecycle, edits, removal and listings.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    AccountId, EventBus, Match, MatchEvent, MatchId, MatchSpec, MatchStatus, MatchSummary,
    Participant, RefundReason,
};
use crate::error::GatewayError;
use crate::persistence::{LedgerStore, MatchFilter, MatchPatch, TransitionOutcome, UpdateOutcome};
use crate::service::refund::RefundReport;
use crate::service::{MatchCapacityEngine, RefundCoordinator};

/// Longest single timer sleep while a room reveal is pending.
const MAX_REVEAL_WAIT: std::time::Duration = std::time::Duration::from_secs(3600);

/// Admin and read-side match operations.
///
/// Every mutation publishes its [`MatchEvent`] after the store has
/// committed it.
#[derive(Debug)]
pub struct MatchService {
    store: Arc<dyn LedgerStore>,
    capacity: Arc<MatchCapacityEngine>,
    refunds: Arc<RefundCoordinator>,
    event_bus: EventBus,
    reveal_window: chrono::Duration,
}

impl MatchService {
    /// Creates a match service.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        capacity: Arc<MatchCapacityEngine>,
        refunds: Arc<RefundCoordinator>,
        event_bus: EventBus,
        reveal_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            capacity,
            refunds,
            event_bus,
            reveal_window,
        }
    }

    /// Creates an `upcoming` match.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] for an empty title or zero
    /// capacity, or a persistence failure.
    pub async fn create_match(
        &self,
        spec: MatchSpec,
        created_by: Option<AccountId>,
    ) -> Result<Match, GatewayError> {
        if spec.title.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("title is required".to_string()));
        }
        if spec.capacity == 0 {
            return Err(GatewayError::InvalidRequest(
                "capacity must be at least 1".to_string(),
            ));
        }
        let m = Match::new(spec, created_by);
        self.store.insert_match(m.clone()).await?;
        tracing::info!(match_id = %m.id, title = %m.spec.title, entry_fee = m.spec.entry_fee, capacity = m.spec.capacity, "match created");
        Ok(m)
    }

    /// Applies an admin patch.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Conflict`] when the capacity would drop below the
    /// roster or the fee would change after someone paid,
    /// [`GatewayError::InvalidRequest`], [`GatewayError::MatchNotFound`] or
    /// a persistence failure.
    pub async fn update_match(
        &self,
        id: MatchId,
        patch: MatchPatch,
    ) -> Result<Match, GatewayError> {
        if patch.capacity == Some(0) {
            return Err(GatewayError::InvalidRequest(
                "capacity must be at least 1".to_string(),
            ));
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(GatewayError::InvalidRequest("title is required".to_string()));
        }
        let touches_room = patch.room.as_ref().is_some_and(|room| !room.is_empty())
            || patch.scheduled_time.is_some();

        let m = match self.store.update_match(id, patch).await? {
            UpdateOutcome::Updated(m) => *m,
            UpdateOutcome::CapacityBelowRoster { participants } => {
                return Err(GatewayError::Conflict(format!(
                    "capacity cannot be lower than the {participants} seated participants"
                )));
            }
            UpdateOutcome::EntryFeeLocked => {
                return Err(GatewayError::Conflict(
                    "entry fee cannot change after participants joined".to_string(),
                ));
            }
            UpdateOutcome::NotFound => return Err(GatewayError::MatchNotFound(id)),
        };
        tracing::info!(match_id = %id, "match updated");

        if touches_room && !m.room.is_empty() {
            self.announce_room(&m);
        }
        Ok(m)
    }

    /// Publishes [`MatchEvent::RoomCredentialsRevealed`] when the reveal
    /// window opens: now if it already has, otherwise from a timer task
    /// that re-reads the match before publishing.
    fn announce_room(&self, m: &Match) {
        if !matches!(m.status, MatchStatus::Upcoming | MatchStatus::Live) {
            return;
        }
        let opens_at = m.spec.scheduled_time - self.reveal_window;
        if opens_at <= Utc::now() {
            self.event_bus.publish(MatchEvent::RoomCredentialsRevealed {
                match_id: m.id,
                scheduled_time: m.spec.scheduled_time,
                timestamp: Utc::now(),
            });
            return;
        }

        let store = Arc::clone(&self.store);
        let event_bus = self.event_bus.clone();
        let window = self.reveal_window;
        let id = m.id;
        tracing::debug!(match_id = %id, %opens_at, "room reveal deferred");
        tokio::spawn(async move {
            while let Ok(wait) = (opens_at - Utc::now()).to_std() {
                if wait.is_zero() {
                    break;
                }
                tokio::time::sleep(wait.min(MAX_REVEAL_WAIT)).await;
            }
            match store.get_match(id).await {
                Ok(Some(m))
                    if !m.room.is_empty()
                        && matches!(m.status, MatchStatus::Upcoming | MatchStatus::Live)
                        && m.room_revealed(Utc::now(), window) =>
                {
                    event_bus.publish(MatchEvent::RoomCredentialsRevealed {
                        match_id: id,
                        scheduled_time: m.spec.scheduled_time,
                        timestamp: Utc::now(),
                    });
                }
                Ok(_) => tracing::debug!(match_id = %id, "room reveal dropped, match changed"),
                Err(e) => tracing::warn!(match_id = %id, error = %e, "room reveal dropped"),
            }
        });
    }

    /// Moves a match through its lifecycle. Cancelling refunds the roster.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidTransition`], [`GatewayError::MatchNotFound`]
    /// or a persistence failure. A failure during the refund leaves the
    /// match cancelled; repeating the call, or the reconciliation sweep,
    /// finishes the refund.
    pub async fn change_status(
        &self,
        id: MatchId,
        next: MatchStatus,
    ) -> Result<Match, GatewayError> {
        let (previous, m) = match self.store.transition_status(id, next).await? {
            TransitionOutcome::Changed { previous, current } => (previous, *current),
            TransitionOutcome::Rejected { current } => {
                return Err(GatewayError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }
            TransitionOutcome::NotFound => return Err(GatewayError::MatchNotFound(id)),
        };
        tracing::info!(match_id = %id, %previous, status = %next, "match status changed");

        if previous != next {
            self.event_bus.publish(MatchEvent::MatchStatusChanged {
                match_id: id,
                title: m.spec.title.clone(),
                previous,
                status: next,
                timestamp: Utc::now(),
            });
        }

        if next == MatchStatus::Cancelled {
            self.refunds
                .refund_roster(id, &m.spec.title, &m.roster, RefundReason::MatchCancelled)
                .await?;
        }
        Ok(m)
    }

    /// Deletes a match, refunding the roster first unless it completed.
    /// Returns the refund report.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MatchNotFound`] or a persistence failure. A refund
    /// failure leaves the match cancelled and in place.
    pub async fn delete_match(&self, id: MatchId) -> Result<RefundReport, GatewayError> {
        let mut m = self.capacity.get_match(id).await?;

        if m.status.is_refundable() {
            // freeze the roster before refunding it
            if m.status != MatchStatus::Cancelled {
                match self
                    .store
                    .transition_status(id, MatchStatus::Cancelled)
                    .await?
                {
                    TransitionOutcome::Changed { current, .. } => m = *current,
                    TransitionOutcome::Rejected { current } => {
                        return Err(GatewayError::InvalidTransition {
                            from: current,
                            to: MatchStatus::Cancelled,
                        });
                    }
                    TransitionOutcome::NotFound => return Err(GatewayError::MatchNotFound(id)),
                }
            }
        }

        let mut report = RefundReport::default();
        if m.status.is_refundable() {
            report = self
                .refunds
                .refund_roster(id, &m.spec.title, &m.roster, RefundReason::MatchDeleted)
                .await?;
        }

        self.capacity.release_all_seats(id).await?;
        if !self.store.delete_match(id).await? {
            return Err(GatewayError::MatchNotFound(id));
        }
        tracing::info!(match_id = %id, refunded = report.refunded, "match deleted");
        self.event_bus.publish(MatchEvent::MatchDeleted {
            match_id: id,
            refunded: report.refunded,
            timestamp: Utc::now(),
        });
        Ok(report)
    }

    /// Removes one participant, refunding their fee unless the match
    /// completed. Returns the removed participant.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotAParticipant`], [`GatewayError::MatchNotFound`]
    /// or a persistence failure.
    pub async fn remove_participant(
        &self,
        id: MatchId,
        account_id: AccountId,
    ) -> Result<Participant, GatewayError> {
        let m = self.capacity.get_match(id).await?;
        let participant = m
            .participant(account_id)
            .cloned()
            .ok_or(GatewayError::NotAParticipant)?;

        if m.status.is_refundable() {
            self.refunds
                .refund_roster(
                    id,
                    &m.spec.title,
                    std::slice::from_ref(&participant),
                    RefundReason::ParticipantRemoved,
                )
                .await?;
        }

        let (removed, participant_count) = self
            .capacity
            .release_seat(id, account_id, Some(participant.seat))
            .await?;
        tracing::info!(match_id = %id, %account_id, participant_count, "participant removed");
        self.event_bus.publish(MatchEvent::ParticipantRemoved {
            match_id: id,
            account_id,
            participant_count,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// `upcoming` and `live` matches with room credentials hidden outside
    /// the reveal window.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn list_public(&self, now: DateTime<Utc>) -> Result<Vec<MatchSummary>, GatewayError> {
        let matches = self
            .capacity
            .list(MatchFilter::with_statuses(&[
                MatchStatus::Upcoming,
                MatchStatus::Live,
            ]))
            .await?;
        Ok(matches
            .iter()
            .map(|m| MatchSummary::public(m, now, self.reveal_window))
            .collect())
    }

    /// One match with room credentials hidden outside the reveal window.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MatchNotFound`] or a persistence failure.
    pub async fn get_public(
        &self,
        id: MatchId,
        now: DateTime<Utc>,
    ) -> Result<(MatchSummary, Vec<Participant>), GatewayError> {
        let m = self.capacity.get_match(id).await?;
        Ok((MatchSummary::public(&m, now, self.reveal_window), m.roster))
    }

    /// Every match, unredacted.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn list_admin(&self) -> Result<Vec<Match>, GatewayError> {
        self.capacity.list(MatchFilter::default()).await
    }

    /// Matches the account is seated in, credentials hidden outside the
    /// reveal window.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn my_matches(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchSummary>, GatewayError> {
        let matches = self
            .capacity
            .list(MatchFilter {
                statuses: None,
                participant: Some(account_id),
            })
            .await?;
        Ok(matches
            .iter()
            .map(|m| MatchSummary::public(m, now, self.reveal_window))
            .collect())
    }
}
