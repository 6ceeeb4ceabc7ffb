//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the services and the
//! API. Expected wallet and match outcomes (insufficient funds, full match,
//! duplicate reference, ...) each have their own variant so that callers
//! can tell the user exactly what went wrong; infrastructure failures are
//! folded into [`GatewayError::Persistence`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{AccountId, EntryId, MatchId, MatchStatus};
use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "insufficient funds: balance 5, required 20",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category             | HTTP Status                   |
/// |-----------|----------------------|-------------------------------|
/// | 1000–1999 | Validation           | 400 Bad Request               |
/// | 2000–2999 | State/Not Found      | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server               | 500 / 503                     |
/// | 4000–4999 | Wallet & match       | 422 Unprocessable / 409       |
/// | 5000–5999 | Authentication       | 401 / 403                     |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Payment signature did not verify.
    #[error("invalid payment signature")]
    InvalidSignature,

    /// Account with the given id was not found.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Match with the given id was not found.
    #[error("match not found: {0}")]
    MatchNotFound(MatchId),

    /// Ledger entry with the given id or reference was not found.
    #[error("ledger entry not found: {0}")]
    EntryNotFound(String),

    /// The match lifecycle forbids the requested transition.
    #[error("cannot move match from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: MatchStatus,
        /// Requested state.
        to: MatchStatus,
    },

    /// The deposit was already approved or rejected.
    #[error("deposit {0} was already processed")]
    AlreadyProcessed(EntryId),

    /// The request conflicts with current state (e.g. capacity below roster).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A join could not be fully compensated; the reconciliation sweep will
    /// finish it.
    #[error("join for account {account_id} on match {match_id} is pending reconciliation")]
    ReconciliationPending {
        /// Account charged.
        account_id: AccountId,
        /// Match being joined.
        match_id: MatchId,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Balance does not cover the charge.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        /// Current balance.
        balance: u64,
        /// Amount required.
        required: u64,
    },

    /// No seat left in the match.
    #[error("match is full")]
    MatchFull,

    /// The account already holds a seat in the match.
    #[error("already joined this match")]
    AlreadyJoined,

    /// The match is not open for joining.
    #[error("match is not open for joining")]
    MatchNotOpen,

    /// Another ledger entry already carries this external reference.
    #[error("external reference already used")]
    DuplicateExternalReference,

    /// The account is not seated in the match.
    #[error("account is not a participant of this match")]
    NotAParticipant,

    /// The join was compensated after its seat step did not finish in time.
    #[error("join timed out and was refunded")]
    JoinExpired,

    /// Missing or invalid credentials.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The caller may not perform this action.
    #[error("forbidden")]
    Forbidden,
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidSignature => 1002,
            Self::AccountNotFound(_) => 2001,
            Self::MatchNotFound(_) => 2002,
            Self::EntryNotFound(_) => 2003,
            Self::InvalidTransition { .. } => 2004,
            Self::AlreadyProcessed(_) => 2005,
            Self::Conflict(_) => 2006,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::ReconciliationPending { .. } => 3002,
            Self::InsufficientFunds { .. } => 4001,
            Self::MatchFull => 4002,
            Self::AlreadyJoined => 4003,
            Self::MatchNotOpen => 4004,
            Self::DuplicateExternalReference => 4005,
            Self::NotAParticipant => 4006,
            Self::JoinExpired => 4007,
            Self::Unauthenticated => 5001,
            Self::Forbidden => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::AccountNotFound(_)
            | Self::MatchNotFound(_)
            | Self::EntryNotFound(_)
            | Self::NotAParticipant => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. }
            | Self::AlreadyProcessed(_)
            | Self::Conflict(_)
            | Self::AlreadyJoined
            | Self::DuplicateExternalReference => StatusCode::CONFLICT,
            Self::InsufficientFunds { .. }
            | Self::MatchFull
            | Self::MatchNotOpen
            | Self::JoinExpired => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ReconciliationPending { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::ReconciliationPending { .. } => Some(
                "the charge will be settled or refunded automatically; check your wallet shortly"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                // store internals stay in the log
                message: match &self {
                    Self::Persistence(_) => "storage unavailable".to_string(),
                    other => other.to_string(),
                },
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
