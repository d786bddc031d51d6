use crate::state::AppState;
use crate::store::StoreError;
use axum::Router;

mod dto;
pub mod handlers;
pub mod machine;
pub mod services;

use machine::{OnboardingState, OnboardingStep};

pub fn router() -> Router<AppState> {
    handlers::onboarding_routes()
}

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("onboarding status has not been loaded")]
    NotLoaded,

    #[error("step {step:?} is not available while in {state:?}")]
    UnexpectedStep {
        state: OnboardingState,
        step: OnboardingStep,
    },

    #[error("add a child before continuing")]
    NoChild,

    #[error("onboarding service timed out")]
    TimedOut,

    #[error("could not save onboarding progress: {0}")]
    Persistence(#[source] StoreError),
}

impl From<StoreError> for OnboardingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TimedOut(_) => Self::TimedOut,
            other => Self::Persistence(other),
        }
    }
}
