//! Match DTOs for listing, administration and joining.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::{Match, MatchSpec, MatchStatus, MatchSummary, Participant, RoomCredentials};
use crate::persistence::MatchPatch;

/// Request body for `POST /admin/matches`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMatchRequest {
    /// Display title.
    pub title: String,
    /// Map name.
    #[serde(default)]
    pub map: String,
    /// Team mode (solo / duo / squad).
    #[serde(default)]
    pub mode: String,
    /// Entry fee in the smallest currency unit.
    #[serde(default)]
    pub entry_fee: u64,
    /// Advertised prize pool.
    #[serde(default)]
    pub prize_pool: u64,
    /// Bonus per kill.
    #[serde(default)]
    pub per_kill_bonus: u64,
    /// Maximum roster size.
    pub capacity: u32,
    /// Scheduled start (RFC 3339).
    pub scheduled_time: DateTime<Utc>,
}

impl From<CreateMatchRequest> for MatchSpec {
    fn from(req: CreateMatchRequest) -> Self {
        Self {
            title: req.title.trim().to_string(),
            map: req.map,
            mode: req.mode,
            entry_fee: req.entry_fee,
            prize_pool: req.prize_pool,
            per_kill_bonus: req.per_kill_bonus,
            capacity: req.capacity,
            scheduled_time: req.scheduled_time,
        }
    }
}

/// Request body for `PATCH /admin/matches/{id}`. Absent fields are kept.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateMatchRequest {
    /// New title.
    pub title: Option<String>,
    /// New map.
    pub map: Option<String>,
    /// New mode.
    pub mode: Option<String>,
    /// New entry fee (refused once anyone joined).
    pub entry_fee: Option<u64>,
    /// New prize pool.
    pub prize_pool: Option<u64>,
    /// New per-kill bonus.
    pub per_kill_bonus: Option<u64>,
    /// New capacity (not below the roster size).
    pub capacity: Option<u32>,
    /// New scheduled start.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Room id; sent together with `room_password`.
    pub room_id: Option<String>,
    /// Room password.
    pub room_password: Option<String>,
}

impl From<UpdateMatchRequest> for MatchPatch {
    fn from(req: UpdateMatchRequest) -> Self {
        let room = match (req.room_id, req.room_password) {
            (None, None) => None,
            (id, password) => Some(RoomCredentials {
                room_id: id.unwrap_or_default(),
                room_password: password.unwrap_or_default(),
            }),
        };
        Self {
            title: req.title,
            map: req.map,
            mode: req.mode,
            entry_fee: req.entry_fee,
            prize_pool: req.prize_pool,
            per_kill_bonus: req.per_kill_bonus,
            capacity: req.capacity,
            scheduled_time: req.scheduled_time,
            room,
        }
    }
}

/// Request body for `PUT /admin/matches/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeStatusRequest {
    /// Target lifecycle state.
    pub status: MatchStatus,
}

/// Optional request body for `POST /matches/{id}/join`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct JoinMatchRequest {
    /// In-game name; defaults to the account's display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Response body for a successful join.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinMatchResponse {
    /// Wallet balance after the entry fee.
    pub balance: u64,
    /// Roster size after the join.
    pub participant_count: usize,
}

/// Paginated match list.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchListResponse {
    /// Matches on this page.
    pub data: Vec<MatchSummary>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Paginated admin match list, with rosters and room credentials.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminMatchListResponse {
    /// Matches on this page.
    pub data: Vec<Match>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Single match with its roster.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchDetailResponse {
    /// Match fields.
    #[serde(flatten)]
    pub summary: MatchSummary,
    /// Participants in join order.
    pub participants: Vec<Participant>,
}

/// Response body for `DELETE /admin/matches/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteMatchResponse {
    /// Seats refunded by this call.
    pub refunded: usize,
    /// Seats refunded by an earlier attempt.
    pub already_refunded: usize,
}
