use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{CurrentInviteResponse, InviteResponse, RedeemRequest, RedeemResponse};
use super::{issuer, redeemer};
use crate::{auth::services::Session, error::ApiError, state::AppState};

pub fn invite_routes() -> Router<AppState> {
    Router::new()
        .route("/invites", post(create_invite))
        .route("/invites/current", get(current_invite))
        .route("/invites/redeem", post(redeem_invite))
}

/// POST /invites → 201 with a new code, 200 when the live one is reused.
#[instrument(skip(state))]
pub async fn create_invite(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<InviteResponse>), ApiError> {
    let issued = issuer::issue(&state, &session).await?;
    let status = if issued.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(issued.into())))
}

#[instrument(skip(state))]
pub async fn current_invite(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<CurrentInviteResponse>, ApiError> {
    let invite = issuer::current(&state, &session).await?;
    Ok(Json(CurrentInviteResponse {
        invite: invite.map(Into::into),
    }))
}

#[instrument(skip(state, payload))]
pub async fn redeem_invite(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let redemption = redeemer::redeem(&state, &session, &payload.code).await?;
    Ok(Json(redemption.into()))
}
