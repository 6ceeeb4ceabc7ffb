//! Match handlers: public listings, joining, and admin lifecycle.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::auth::require;
use crate::api::dto::{
    AdminMatchListResponse, ChangeStatusRequest, CreateMatchRequest, DeleteMatchResponse,
    JoinMatchRequest, JoinMatchResponse, MatchDetailResponse, MatchListResponse,
    PaginationParams, UpdateMatchRequest,
};
use crate::app_state::AppState;
use crate::domain::{AccountId, Action, Actor, Match, MatchId, MatchSpec, Participant};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /matches`: Public match list.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/matches",
    tag = "Matches",
    summary = "List matches",
    description = "Returns upcoming and live matches ordered by scheduled time. Room credentials read `Hidden` until shortly before the start.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated match list", body = MatchListResponse),
    )
)]
pub async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let matches = state.matches.list_public(Utc::now()).await?;
    let (data, pagination) = params.paginate(matches);
    Ok(Json(MatchListResponse { data, pagination }))
}

/// `GET /matches/{id}`: Single match with its roster.
///
/// # Errors
///
/// Returns [`GatewayError::MatchNotFound`] if the match does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/matches/{id}",
    tag = "Matches",
    summary = "Get match details",
    params(
        ("id" = uuid::Uuid, Path, description = "Match UUID"),
    ),
    responses(
        (status = 200, description = "Match details", body = MatchDetailResponse),
        (status = 404, description = "Match not found", body = ErrorResponse),
    )
)]
pub async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<MatchId>,
) -> Result<impl IntoResponse, GatewayError> {
    let (summary, participants) = state.matches.get_public(id, Utc::now()).await?;
    Ok(Json(MatchDetailResponse {
        summary,
        participants,
    }))
}

/// `GET /matches/my`: Matches the caller holds a seat in.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthenticated`] without a valid token.
#[utoipa::path(
    get,
    path = "/api/v1/matches/my",
    tag = "Matches",
    summary = "List joined matches",
    params(PaginationParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Joined matches", body = MatchListResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn my_matches(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ViewMatches)?;
    let matches = state
        .matches
        .my_matches(actor.account_id, Utc::now())
        .await?;
    let (data, pagination) = params.paginate(matches);
    Ok(Json(MatchListResponse { data, pagination }))
}

/// `POST /matches/{id}/join`: Pay the entry fee and take a seat.
///
/// # Errors
///
/// Returns [`GatewayError::InsufficientFunds`], [`GatewayError::MatchFull`],
/// [`GatewayError::AlreadyJoined`] or [`GatewayError::MatchNotOpen`] when the
/// join is refused; the wallet is unchanged in all of these cases.
#[utoipa::path(
    post,
    path = "/api/v1/matches/{id}/join",
    tag = "Matches",
    summary = "Join a match",
    description = "Charges the entry fee and reserves a seat as one unit: either both happen or neither does. A `503` means the outcome is being reconciled and the wallet will be corrected automatically.",
    params(
        ("id" = uuid::Uuid, Path, description = "Match UUID"),
    ),
    request_body(content = JoinMatchRequest, description = "Optional in-game name"),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Seat reserved", body = JoinMatchResponse),
        (status = 404, description = "Match not found", body = ErrorResponse),
        (status = 409, description = "Already joined", body = ErrorResponse),
        (status = 422, description = "Insufficient funds, match full or not open", body = ErrorResponse),
        (status = 503, description = "Pending reconciliation", body = ErrorResponse),
    )
)]
pub async fn join_match(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<MatchId>,
    body: Option<Json<JoinMatchRequest>>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::JoinMatch)?;
    let display_name = body.and_then(|Json(req)| req.display_name);
    let receipt = state
        .joins
        .join_match(id, actor.account_id, display_name)
        .await?;
    Ok(Json(JoinMatchResponse {
        balance: receipt.balance,
        participant_count: receipt.participant_count,
    }))
}

/// `GET /admin/matches`: Every match, with rosters and room credentials.
///
/// # Errors
///
/// Returns [`GatewayError::Forbidden`] for non-admins.
#[utoipa::path(
    get,
    path = "/api/v1/admin/matches",
    tag = "Admin",
    summary = "List all matches",
    params(PaginationParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Paginated match list", body = AdminMatchListResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
    )
)]
pub async fn list_admin_matches(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageMatches)?;
    let matches = state.matches.list_admin().await?;
    let (data, pagination) = params.paginate(matches);
    Ok(Json(AdminMatchListResponse { data, pagination }))
}

/// `POST /admin/matches`: Create a match.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a blank title or zero capacity.
#[utoipa::path(
    post,
    path = "/api/v1/admin/matches",
    tag = "Admin",
    summary = "Create a match",
    request_body = CreateMatchRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Match created", body = Match),
        (status = 400, description = "Invalid match", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
    )
)]
pub async fn create_match(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateMatchRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageMatches)?;
    let created = state
        .matches
        .create_match(MatchSpec::from(req), Some(actor.account_id))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PATCH /admin/matches/{id}`: Edit match fields and room credentials.
///
/// # Errors
///
/// Returns [`GatewayError::Conflict`] when the capacity would drop below the
/// roster or the fee changes after someone joined.
#[utoipa::path(
    patch,
    path = "/api/v1/admin/matches/{id}",
    tag = "Admin",
    summary = "Update a match",
    params(
        ("id" = uuid::Uuid, Path, description = "Match UUID"),
    ),
    request_body = UpdateMatchRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated match", body = Match),
        (status = 404, description = "Match not found", body = ErrorResponse),
        (status = 409, description = "Edit conflicts with the roster", body = ErrorResponse),
    )
)]
pub async fn update_match(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<MatchId>,
    Json(req): Json<UpdateMatchRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageMatches)?;
    let updated = state.matches.update_match(id, req.into()).await?;
    Ok(Json(updated))
}

/// `PUT /admin/matches/{id}/status`: Move a match through its lifecycle.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidTransition`] for a transition the
/// lifecycle does not allow.
#[utoipa::path(
    put,
    path = "/api/v1/admin/matches/{id}/status",
    tag = "Admin",
    summary = "Change match status",
    description = "Cancelling a match with an entry fee refunds every participant exactly once.",
    params(
        ("id" = uuid::Uuid, Path, description = "Match UUID"),
    ),
    request_body = ChangeStatusRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Match after the transition", body = Match),
        (status = 404, description = "Match not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
    )
)]
pub async fn change_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<MatchId>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageMatches)?;
    let updated = state.matches.change_status(id, req.status).await?;
    Ok(Json(updated))
}

/// `DELETE /admin/matches/{id}`: Refund the roster, then delete.
///
/// # Errors
///
/// Returns [`GatewayError::MatchNotFound`] if the match does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/matches/{id}",
    tag = "Admin",
    summary = "Delete a match",
    params(
        ("id" = uuid::Uuid, Path, description = "Match UUID"),
    ),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Match deleted", body = DeleteMatchResponse),
        (status = 404, description = "Match not found", body = ErrorResponse),
    )
)]
pub async fn delete_match(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<MatchId>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageMatches)?;
    let report = state.matches.delete_match(id).await?;
    Ok(Json(DeleteMatchResponse {
        refunded: report.refunded,
        already_refunded: report.already_refunded,
    }))
}

/// `DELETE /admin/matches/{id}/participants/{account_id}`: Remove and refund one participant.
///
/// # Errors
///
/// Returns [`GatewayError::NotAParticipant`] if the account holds no seat.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/matches/{id}/participants/{account_id}",
    tag = "Admin",
    summary = "Remove a participant",
    params(
        ("id" = uuid::Uuid, Path, description = "Match UUID"),
        ("account_id" = uuid::Uuid, Path, description = "Participant's account UUID"),
    ),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Removed participant", body = Participant),
        (status = 404, description = "Match or participant not found", body = ErrorResponse),
    )
)]
pub async fn remove_participant(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, account_id)): Path<(MatchId, AccountId)>,
) -> Result<impl IntoResponse, GatewayError> {
    require(&actor, Action::ManageMatches)?;
    let removed = state.matches.remove_participant(id, account_id).await?;
    Ok(Json(removed))
}

/// Match routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/matches", get(list_matches))
        .route("/matches/my", get(my_matches))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/join", post(join_match))
        .route(
            "/admin/matches",
            get(list_admin_matches).post(create_match),
        )
        .route(
            "/admin/matches/{id}",
            delete(delete_match).patch(update_match),
        )
        .route("/admin/matches/{id}/status", put(change_status))
        .route(
            "/admin/matches/{id}/participants/{account_id}",
            delete(remove_participant),
        )
}
