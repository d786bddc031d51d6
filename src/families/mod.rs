use crate::state::AppState;
use crate::store::StoreError;
use axum::Router;

mod dto;
pub mod handlers;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::family_routes()
}

#[derive(Debug, thiserror::Error)]
pub enum FamilyError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("create or join a family first")]
    NotInFamily,

    #[error("you already belong to a family")]
    AlreadyInFamily,

    #[error("family service timed out")]
    TimedOut,

    #[error("could not save, try again: {0}")]
    Persistence(#[source] StoreError),
}

impl From<StoreError> for FamilyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TimedOut(_) => Self::TimedOut,
            other => Self::Persistence(other),
        }
    }
}
