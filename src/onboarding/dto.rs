use serde::{Deserialize, Serialize};

use super::machine::{OnboardingFlags, OnboardingState, OnboardingStep};
use super::services::OnboardingStatus;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: OnboardingState,
    pub flags: OnboardingFlags,
}

impl From<OnboardingStatus> for StatusResponse {
    fn from(s: OnboardingStatus) -> Self {
        Self {
            state: s.state,
            flags: s.flags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    pub step: OnboardingStep,
}
