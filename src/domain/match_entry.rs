//! Match aggregate: economics, lifecycle and the bounded roster.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AccountId, JoinId, MatchId};

/// Placeholder shown instead of room credentials outside the reveal window.
pub const HIDDEN_CREDENTIAL: &str = "Hidden";

/// Lifecycle state of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Open for joining.
    Upcoming,
    /// In progress; roster frozen.
    Live,
    /// Finished. Never refunded by the cancellation path.
    Completed,
    /// Called off; participants refunded.
    Cancelled,
}

impl MatchStatus {
    /// Returns the storage/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a match may move from `self` to `next`.
    ///
    /// `upcoming → live → completed` and `upcoming | live → cancelled`.
    /// Re-cancelling an already cancelled match is allowed so that a
    /// crashed cancellation can be retried.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Upcoming, Self::Live)
                | (Self::Live, Self::Completed)
                | (Self::Upcoming | Self::Live | Self::Cancelled, Self::Cancelled)
        )
    }

    /// Whether entry fees paid into a match in this state are refundable.
    #[must_use]
    pub const fn is_refundable(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "live" => Ok(Self::Live),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown match status: {other}")),
        }
    }
}

/// Membership of one account in one match's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Participant {
    /// Seated account.
    pub account_id: AccountId,
    /// In-game name shown on the roster.
    pub display_name: String,
    /// Join attempt that produced this seat; keys its refund.
    pub seat: JoinId,
    /// When the seat was reserved.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Creates a participant for the given join attempt.
    #[must_use]
    pub fn new(account_id: AccountId, display_name: impl Into<String>, seat: JoinId) -> Self {
        Self {
            account_id,
            display_name: display_name.into(),
            seat,
            joined_at: Utc::now(),
        }
    }
}

/// In-game room id and password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomCredentials {
    /// Room id.
    pub room_id: String,
    /// Room password.
    pub room_password: String,
}

impl RoomCredentials {
    /// Returns `true` when neither credential has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.room_id.is_empty() && self.room_password.is_empty()
    }

    fn hidden() -> Self {
        Self {
            room_id: HIDDEN_CREDENTIAL.to_string(),
            room_password: HIDDEN_CREDENTIAL.to_string(),
        }
    }
}

/// Descriptive and economic fields of a match, as supplied by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchSpec {
    /// Display title.
    pub title: String,
    /// Map name.
    pub map: String,
    /// Team mode (solo / duo / squad).
    pub mode: String,
    /// Entry fee in the smallest currency unit.
    pub entry_fee: u64,
    /// Advertised prize pool.
    pub prize_pool: u64,
    /// Bonus per kill.
    pub per_kill_bonus: u64,
    /// Maximum roster size, at least 1.
    pub capacity: u32,
    /// Scheduled start.
    pub scheduled_time: DateTime<Utc>,
}

/// A joinable competitive event with fixed economics.
///
/// The roster is only ever changed by the store's reserve/release
/// primitives; `roster.len() <= capacity` holds at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Match {
    /// Match identity.
    pub id: MatchId,
    /// Descriptive fields and economics.
    #[serde(flatten)]
    pub spec: MatchSpec,
    /// Lifecycle state.
    pub status: MatchStatus,
    /// Participants in join order.
    pub roster: Vec<Participant>,
    /// Room credentials, revealed near start time.
    pub room: RoomCredentials,
    /// Admin that created the match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<AccountId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Creates an `upcoming` match with an empty roster.
    #[must_use]
    pub fn new(spec: MatchSpec, created_by: Option<AccountId>) -> Self {
        let now = Utc::now();
        Self {
            id: MatchId::new(),
            spec,
            status: MatchStatus::Upcoming,
            roster: Vec::new(),
            room: RoomCredentials::default(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of seated participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.roster.len()
    }

    /// Returns the participant record for an account, if seated.
    #[must_use]
    pub fn participant(&self, account_id: AccountId) -> Option<&Participant> {
        self.roster.iter().find(|p| p.account_id == account_id)
    }

    /// Returns `true` if the account holds a seat.
    #[must_use]
    pub fn is_participant(&self, account_id: AccountId) -> bool {
        self.participant(account_id).is_some()
    }

    /// Returns `true` if no seat is left.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.roster.len() >= self.spec.capacity as usize
    }

    /// Whether room credentials may be shown to non-admins at `now`.
    #[must_use]
    pub fn room_revealed(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.spec.scheduled_time - now <= window
    }
}

/// Roster-free view of a match for list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchSummary {
    /// Match identity.
    pub id: MatchId,
    /// Descriptive fields and economics.
    #[serde(flatten)]
    pub spec: MatchSpec,
    /// Lifecycle state.
    pub status: MatchStatus,
    /// Number of seated participants.
    pub participant_count: usize,
    /// Room credentials, possibly replaced by placeholders.
    pub room: RoomCredentials,
}

impl MatchSummary {
    /// Public view: room credentials hidden until the reveal window opens.
    #[must_use]
    pub fn public(m: &Match, now: DateTime<Utc>, window: Duration) -> Self {
        let room = if m.room_revealed(now, window) {
            m.room.clone()
        } else {
            RoomCredentials::hidden()
        };
        Self {
            id: m.id,
            spec: m.spec.clone(),
            status: m.status,
            participant_count: m.participant_count(),
            room,
        }
    }
}

impl From<&Match> for MatchSummary {
    fn from(m: &Match) -> Self {
        Self {
            id: m.id,
            spec: m.spec.clone(),
            status: m.status,
            participant_count: m.participant_count(),
            room: m.room.clone(),
        }
    }
}
