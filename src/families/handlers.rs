use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{ChildResponse, CreateChildRequest, CreateFamilyRequest, FamilyResponse, GoalResponse};
use super::services;
use crate::{auth::services::Session, error::ApiError, state::AppState};

pub fn family_routes() -> Router<AppState> {
    Router::new()
        .route("/families", post(create_family))
        .route("/children", get(list_children).post(create_child))
        .route("/goals", get(list_goals))
}

#[instrument(skip(state))]
pub async fn create_family(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateFamilyRequest>,
) -> Result<(StatusCode, Json<FamilyResponse>), ApiError> {
    let family = services::create_family(&state, &session, &body.name).await?;
    Ok((StatusCode::CREATED, Json(family.into())))
}

#[instrument(skip(state))]
pub async fn create_child(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CreateChildRequest>,
) -> Result<(StatusCode, Json<ChildResponse>), ApiError> {
    let child =
        services::add_child(&state, &session, &body.name, body.birth_date.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(child.into())))
}

#[instrument(skip(state))]
pub async fn list_children(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<ChildResponse>>, ApiError> {
    let children = services::list_children(&state, &session).await?;
    Ok(Json(children.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn list_goals(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<GoalResponse>>, ApiError> {
    let goals = services::list_goals(&state, &session).await?;
    Ok(Json(goals.into_iter().map(Into::into).collect()))
}
