//! API error type and its JSON response shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::families::FamilyError;
use crate::invites::InviteError;
use crate::onboarding::OnboardingError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {1}")]
    BadRequest(&'static str, String),

    #[error("not found: {1}")]
    NotFound(&'static str, String),

    /// The resource existed but is no longer usable.
    #[error("gone: {1}")]
    Gone(&'static str, String),

    #[error("conflict: {1}")]
    Conflict(&'static str, String),

    #[error("timed out")]
    TimedOut,

    /// A multi-step write may have been left half-applied.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest(code, msg) => (StatusCode::BAD_REQUEST, code, msg),
            Self::NotFound(code, msg) => (StatusCode::NOT_FOUND, code, msg),
            Self::Gone(code, msg) => (StatusCode::GONE, code, msg),
            Self::Conflict(code, msg) => (StatusCode::CONFLICT, code, msg),
            Self::TimedOut => (
                StatusCode::GATEWAY_TIMEOUT,
                "timed_out",
                "The request took too long, try again".to_string(),
            ),
            Self::Inconsistent(msg) => {
                tracing::error!(error = %msg, "request left inconsistent state");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "partial_failure",
                    "Joining the family did not complete, please contact support".to_string(),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        let msg = err.to_string();
        match err {
            InviteError::NotInFamily => Self::Conflict("not_in_family", msg),
            InviteError::InvalidCode => Self::NotFound("invalid_code", msg),
            InviteError::ExpiredCode => Self::Gone("expired_code", msg),
            InviteError::OwnInvite => Self::Conflict("own_invite", msg),
            InviteError::ConcurrentRedemptionLost => Self::Conflict("redemption_lost", msg),
            InviteError::PartialRedemptionFailure(_) => Self::Inconsistent(msg),
            InviteError::TimedOut => Self::TimedOut,
            InviteError::Persistence(_) => Self::Internal(msg),
        }
    }
}

impl From<FamilyError> for ApiError {
    fn from(err: FamilyError) -> Self {
        let msg = err.to_string();
        match err {
            FamilyError::InvalidInput(_) => Self::BadRequest("invalid_input", msg),
            FamilyError::NotInFamily => Self::Conflict("not_in_family", msg),
            FamilyError::AlreadyInFamily => Self::Conflict("already_in_family", msg),
            FamilyError::TimedOut => Self::TimedOut,
            FamilyError::Persistence(_) => Self::Internal(msg),
        }
    }
}

impl From<OnboardingError> for ApiError {
    fn from(err: OnboardingError) -> Self {
        let msg = err.to_string();
        match err {
            OnboardingError::NotLoaded => Self::Internal(msg),
            OnboardingError::UnexpectedStep { .. } => Self::Conflict("unexpected_step", msg),
            OnboardingError::NoChild => Self::Conflict("no_child", msg),
            OnboardingError::TimedOut => Self::TimedOut,
            OnboardingError::Persistence(_) => Self::Internal(msg),
        }
    }
}
