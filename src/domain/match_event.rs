//! Notification events reflecting committed match state changes.
//!
//! Events are published through the [`super::EventBus`] only after the
//! authoritative state change has committed. Delivery is best-effort: a
//! subscriber that misses an event re-fetches state over REST.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AccountId, MatchId, MatchStatus};

/// Notification emitted after a match mutation commits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MatchEvent {
    /// A seat was reserved and paid for.
    ParticipantJoined {
        /// Match topic.
        match_id: MatchId,
        /// Newly seated account.
        account_id: AccountId,
        /// Roster display name.
        display_name: String,
        /// Roster size after the join.
        participant_count: usize,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An admin removed a participant.
    ParticipantRemoved {
        /// Match topic.
        match_id: MatchId,
        /// Removed account.
        account_id: AccountId,
        /// Roster size after the removal.
        participant_count: usize,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The match moved to a new lifecycle state.
    MatchStatusChanged {
        /// Match topic.
        match_id: MatchId,
        /// Match title, for display.
        title: String,
        /// State before the change.
        previous: MatchStatus,
        /// State after the change.
        status: MatchStatus,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Room credentials are set and the reveal window is open. Carries no
    /// credentials; clients fetch the match to read them.
    RoomCredentialsRevealed {
        /// Match topic.
        match_id: MatchId,
        /// Scheduled start.
        scheduled_time: DateTime<Utc>,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The match was deleted.
    MatchDeleted {
        /// Match topic.
        match_id: MatchId,
        /// Number of participants refunded before removal.
        refunded: usize,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl MatchEvent {
    /// Returns the match topic this event belongs to.
    #[must_use]
    pub fn match_id(&self) -> MatchId {
        match self {
            Self::ParticipantJoined { match_id, .. }
            | Self::ParticipantRemoved { match_id, .. }
            | Self::MatchStatusChanged { match_id, .. }
            | Self::RoomCredentialsRevealed { match_id, .. }
            | Self::MatchDeleted { match_id, .. } => *match_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantRemoved { .. } => "participant_removed",
            Self::MatchStatusChanged { .. } => "match_status_changed",
            Self::RoomCredentialsRevealed { .. } => "room_credentials_revealed",
            Self::MatchDeleted { .. } => "match_deleted",
        }
    }
}
