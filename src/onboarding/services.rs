use tracing::{debug, info};

use super::machine::{Effect, OnboardingFlags, OnboardingState, OnboardingStep, Sequencer};
use super::OnboardingError;
use crate::auth::services::Session;
use crate::state::AppState;
use crate::store::bounded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingStatus {
    pub state: OnboardingState,
    pub flags: OnboardingFlags,
}

impl OnboardingStatus {
    fn of(flags: OnboardingFlags) -> Self {
        Self {
            state: OnboardingState::from_flags(Some(&flags)),
            flags,
        }
    }
}

async fn load(st: &AppState, session: &Session) -> Result<Sequencer, OnboardingError> {
    let flags = bounded(st.store_timeout(), st.store.onboarding_flags(session.user_id)).await?;
    Ok(Sequencer::loaded(flags))
}

pub async fn status(st: &AppState, session: &Session) -> Result<OnboardingStatus, OnboardingError> {
    let seq = load(st, session).await?;
    let flags = seq.flags().copied().ok_or(OnboardingError::NotLoaded)?;
    Ok(OnboardingStatus::of(flags))
}

/// Applies one user step to the stored flags and persists the flag it raises.
pub async fn advance(
    st: &AppState,
    session: &Session,
    step: OnboardingStep,
) -> Result<OnboardingStatus, OnboardingError> {
    let user_id = session.user_id;
    let mut seq = load(st, session).await?;

    if step == OnboardingStep::AddChild {
        // confirms a child the user can already see, e.g. one shared through an invite
        let children = bounded(st.store_timeout(), st.store.children_for(user_id)).await?;
        if children.is_empty() {
            return Err(OnboardingError::NoChild);
        }
    }

    let transition = seq.advance(step)?;
    match transition.effect {
        Some(Effect::SeedGoals) => {
            let seeded = bounded(st.store_timeout(), st.store.complete_onboarding(user_id)).await?;
            match seeded {
                Some(n) => info!(%user_id, goals = n, "onboarding completed, goals seeded"),
                None => debug!(%user_id, "questionnaire already recorded"),
            }
        }
        None => {
            bounded(st.store_timeout(), st.store.raise_flag(user_id, step.flag())).await?;
        }
    }

    debug!(%user_id, from = ?transition.from, to = ?transition.to, "onboarding advanced");
    let flags = seq.flags().copied().ok_or(OnboardingError::NotLoaded)?;
    Ok(OnboardingStatus::of(flags))
}
