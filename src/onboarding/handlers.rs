use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{StatusResponse, StepRequest};
use super::services;
use crate::{auth::services::Session, error::ApiError, state::AppState};

pub fn onboarding_routes() -> Router<AppState> {
    Router::new()
        .route("/onboarding", get(get_status))
        .route("/onboarding/steps", post(post_step))
}

#[instrument(skip(state))]
pub async fn get_status(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = services::status(&state, &session).await?;
    Ok(Json(status.into()))
}

/// POST /onboarding/steps { "step": "complete_questionnaire" | "add_child" | "send_invite" | "skip_invite" | "dismiss_success" }
#[instrument(skip(state))]
pub async fn post_step(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<StepRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = services::advance(&state, &session, body.step).await?;
    Ok(Json(status.into()))
}
