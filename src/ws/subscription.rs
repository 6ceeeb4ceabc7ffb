//! Per-connection subscription manager.
//!
//! Tracks which match topics a WebSocket client follows and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::MatchId;

/// Manages the set of match subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed match IDs. Ignored while `subscribe_all` is set.
    match_ids: HashSet<MatchId>,
    /// Wildcard `"*"` subscription.
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds match IDs to the subscription set, optionally enabling the wildcard.
    pub fn subscribe(&mut self, ids: &[MatchId], wildcard: bool) {
        self.subscribe_all |= wildcard;
        self.match_ids.extend(ids.iter().copied());
    }

    /// Removes match IDs, optionally dropping the wildcard.
    pub fn unsubscribe(&mut self, ids: &[MatchId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.match_ids.remove(id);
        }
    }

    /// Returns `true` if events for `match_id` should be forwarded.
    #[must_use]
    pub fn matches(&self, match_id: MatchId) -> bool {
        self.subscribe_all || self.match_ids.contains(&match_id)
    }

    /// Number of explicitly subscribed matches.
    #[must_use]
    pub fn count(&self) -> usize {
        self.match_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}
