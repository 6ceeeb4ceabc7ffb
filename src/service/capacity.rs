//! Match capacity engine: seat reservation against a bounded roster.

use std::sync::Arc;

use crate::domain::{AccountId, JoinId, Match, MatchId, Participant};
use crate::error::GatewayError;
use crate::persistence::{LedgerStore, MatchFilter, ReadRetry, ReleaseOutcome, ReserveOutcome};

/// Atomic reserve/release primitives over a match roster.
///
/// The capacity check and the roster append happen inside one store
/// primitive, so N concurrent reservations against `k` free seats admit
/// exactly `k` of them.
#[derive(Debug)]
pub struct MatchCapacityEngine {
    store: Arc<dyn LedgerStore>,
    retry: ReadRetry,
}

impl MatchCapacityEngine {
    /// Creates a capacity engine.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, retry: ReadRetry) -> Self {
        Self { store, retry }
    }

    /// Loads a match with its roster.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MatchNotFound`] or a persistence failure.
    pub async fn get_match(&self, id: MatchId) -> Result<Match, GatewayError> {
        self.retry
            .run("get_match", || self.store.get_match(id))
            .await?
            .ok_or(GatewayError::MatchNotFound(id))
    }

    /// Loads matches passing `filter`, ordered by scheduled time.
    ///
    /// # Errors
    ///
    /// Persistence failures only.
    pub async fn list(&self, filter: MatchFilter) -> Result<Vec<Match>, GatewayError> {
        Ok(self
            .retry
            .run("list_matches", || self.store.list_matches(filter.clone()))
            .await?)
    }

    /// Reserves a seat. Returns the roster size after the reservation.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MatchFull`], [`GatewayError::AlreadyJoined`],
    /// [`GatewayError::MatchNotOpen`], [`GatewayError::MatchNotFound`] or a
    /// persistence failure.
    pub async fn reserve_seat(
        &self,
        match_id: MatchId,
        participant: Participant,
    ) -> Result<usize, GatewayError> {
        let account_id = participant.account_id;
        match self.store.reserve_seat(match_id, participant).await? {
            ReserveOutcome::Reserved { participant_count } => {
                tracing::debug!(%match_id, %account_id, participant_count, "seat reserved");
                Ok(participant_count)
            }
            ReserveOutcome::MatchFull => Err(GatewayError::MatchFull),
            ReserveOutcome::AlreadyJoined => Err(GatewayError::AlreadyJoined),
            ReserveOutcome::MatchNotOpen => Err(GatewayError::MatchNotOpen),
            ReserveOutcome::MatchNotFound => Err(GatewayError::MatchNotFound(match_id)),
        }
    }

    /// Removes an account's seat. With `seat` set, only that exact seat is
    /// removed. Returns the removed participant and the new roster size.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotAParticipant`], [`GatewayError::MatchNotFound`] or
    /// a persistence failure.
    pub async fn release_seat(
        &self,
        match_id: MatchId,
        account_id: AccountId,
        seat: Option<JoinId>,
    ) -> Result<(Participant, usize), GatewayError> {
        match self.store.release_seat(match_id, account_id, seat).await? {
            ReleaseOutcome::Released {
                participant,
                participant_count,
            } => {
                tracing::debug!(%match_id, %account_id, participant_count, "seat released");
                Ok((participant, participant_count))
            }
            ReleaseOutcome::NotAParticipant => Err(GatewayError::NotAParticipant),
            ReleaseOutcome::MatchNotFound => Err(GatewayError::MatchNotFound(match_id)),
        }
    }

    /// Empties the roster and returns the released participants in join
    /// order.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MatchNotFound`] or a persistence failure.
    pub async fn release_all_seats(
        &self,
        match_id: MatchId,
    ) -> Result<Vec<Participant>, GatewayError> {
        let released = self
            .store
            .release_all_seats(match_id)
            .await?
            .ok_or(GatewayError::MatchNotFound(match_id))?;
        tracing::debug!(%match_id, released = released.len(), "roster emptied");
        Ok(released)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::MatchStatus;
    use crate::domain::match_entry::tests::spec;
    use crate::persistence::MemoryLedgerStore;

    async fn engine_with_match(capacity: u32) -> (Arc<MatchCapacityEngine>, MatchId) {
        let store = Arc::new(MemoryLedgerStore::new());
        let m = Match::new(spec(0, capacity), None);
        let id = m.id;
        let Ok(()) = store.insert_match(m).await else {
            panic!("insert failed");
        };
        (
            Arc::new(MatchCapacityEngine::new(store, ReadRetry::none())),
            id,
        )
    }

    fn seat(account_id: AccountId) -> Participant {
        Participant::new(account_id, "ace", JoinId::new())
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded_under_contention() {
        let (engine, id) = engine_with_match(4).await;
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.reserve_seat(id, seat(AccountId::new())).await })
            })
            .collect();

        let mut reserved = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => reserved += 1,
                Ok(Err(GatewayError::MatchFull)) => full += 1,
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!(reserved, 4);
        assert_eq!(full, 12);

        let Ok(m) = engine.get_match(id).await else {
            panic!("match missing");
        };
        assert_eq!(m.roster.len(), 4);
    }

    #[tokio::test]
    async fn same_account_joins_once() {
        let (engine, id) = engine_with_match(4).await;
        let account = AccountId::new();
        let (first, second) = tokio::join!(
            engine.reserve_seat(id, seat(account)),
            engine.reserve_seat(id, seat(account))
        );
        let results = [first.is_ok(), second.is_ok()];
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert!(
            matches!(first, Err(GatewayError::AlreadyJoined))
                || matches!(second, Err(GatewayError::AlreadyJoined))
        );
    }

    #[tokio::test]
    async fn release_and_release_all() {
        let (engine, id) = engine_with_match(4).await;
        let a = AccountId::new();
        let b = AccountId::new();
        assert_eq!(engine.reserve_seat(id, seat(a)).await.ok(), Some(1));
        assert_eq!(engine.reserve_seat(id, seat(b)).await.ok(), Some(2));

        let Ok((removed, count)) = engine.release_seat(id, a, None).await else {
            panic!("release failed");
        };
        assert_eq!(removed.account_id, a);
        assert_eq!(count, 1);
        assert!(matches!(
            engine.release_seat(id, a, None).await,
            Err(GatewayError::NotAParticipant)
        ));

        let Ok(released) = engine.release_all_seats(id).await else {
            panic!("release all failed");
        };
        assert_eq!(released.iter().map(|p| p.account_id).collect::<Vec<_>>(), vec![b]);
        assert!(matches!(
            engine.release_all_seats(MatchId::new()).await,
            Err(GatewayError::MatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn closed_matches_refuse_seats() {
        let (engine, id) = engine_with_match(4).await;
        let Ok(_) = engine.store.transition_status(id, MatchStatus::Live).await else {
            panic!("transition failed");
        };
        assert!(matches!(
            engine.reserve_seat(id, seat(AccountId::new())).await,
            Err(GatewayError::MatchNotOpen)
        ));
    }
}
