use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::OnboardingError;

/// Per-user first-run flags. Each one only ever goes from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OnboardingFlags {
    pub has_completed_onboarding: bool,
    pub has_child: bool,
    pub has_sent_invite: bool,
    pub has_seen_success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingFlag {
    CompletedOnboarding,
    HasChild,
    SentInvite,
    SeenSuccess,
}

impl OnboardingFlag {
    pub fn column(self) -> &'static str {
        match self {
            Self::CompletedOnboarding => "has_completed_onboarding",
            Self::HasChild => "has_child",
            Self::SentInvite => "has_sent_invite",
            Self::SeenSuccess => "has_seen_success",
        }
    }
}

impl OnboardingFlags {
    /// Returns true if the flag was previously unset.
    pub fn raise(&mut self, flag: OnboardingFlag) -> bool {
        let slot = match flag {
            OnboardingFlag::CompletedOnboarding => &mut self.has_completed_onboarding,
            OnboardingFlag::HasChild => &mut self.has_child,
            OnboardingFlag::SentInvite => &mut self.has_sent_invite,
            OnboardingFlag::SeenSuccess => &mut self.has_seen_success,
        };
        !std::mem::replace(slot, true)
    }
}

/// Screen the first-run flow should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    Loading,
    NeedsOnboarding,
    NeedsChild,
    NeedsInvite,
    NeedsSuccessAck,
    Done,
}

impl OnboardingState {
    /// First matching row wins. No flag is inferred from another.
    pub fn from_flags(flags: Option<&OnboardingFlags>) -> Self {
        let Some(f) = flags else {
            return Self::Loading;
        };
        match (
            f.has_completed_onboarding,
            f.has_child,
            f.has_sent_invite,
            f.has_seen_success,
        ) {
            (false, _, _, _) => Self::NeedsOnboarding,
            (true, false, _, _) => Self::NeedsChild,
            (true, true, false, _) => Self::NeedsInvite,
            (true, true, true, false) => Self::NeedsSuccessAck,
            (true, true, true, true) => Self::Done,
        }
    }
}

/// Explicit user action that leaves one onboarding screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    CompleteQuestionnaire,
    AddChild,
    SendInvite,
    SkipInvite,
    DismissSuccess,
}

impl OnboardingStep {
    /// The only state this step may be taken from.
    pub fn leaves(self) -> OnboardingState {
        match self {
            Self::CompleteQuestionnaire => OnboardingState::NeedsOnboarding,
            Self::AddChild => OnboardingState::NeedsChild,
            Self::SendInvite | Self::SkipInvite => OnboardingState::NeedsInvite,
            Self::DismissSuccess => OnboardingState::NeedsSuccessAck,
        }
    }

    pub fn flag(self) -> OnboardingFlag {
        match self {
            Self::CompleteQuestionnaire => OnboardingFlag::CompletedOnboarding,
            Self::AddChild => OnboardingFlag::HasChild,
            Self::SendInvite | Self::SkipInvite => OnboardingFlag::SentInvite,
            Self::DismissSuccess => OnboardingFlag::SeenSuccess,
        }
    }
}

/// Side effect bound to a single transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Clone the default goal templates into the user's goals.
    SeedGoals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OnboardingState,
    pub to: OnboardingState,
    pub effect: Option<Effect>,
}

/// Holds the flags fetched for the session and applies steps to them in memory.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    flags: Option<OnboardingFlags>,
}

impl Sequencer {
    pub fn loaded(flags: OnboardingFlags) -> Self {
        let mut seq = Self::default();
        seq.load(flags);
        seq
    }

    pub fn load(&mut self, flags: OnboardingFlags) {
        self.flags = Some(flags);
    }

    pub fn flags(&self) -> Option<&OnboardingFlags> {
        self.flags.as_ref()
    }

    pub fn state(&self) -> OnboardingState {
        OnboardingState::from_flags(self.flags.as_ref())
    }

    pub fn advance(&mut self, step: OnboardingStep) -> Result<Transition, OnboardingError> {
        let from = self.state();
        let Some(flags) = self.flags.as_mut() else {
            return Err(OnboardingError::NotLoaded);
        };
        if step.leaves() != from {
            return Err(OnboardingError::UnexpectedStep { state: from, step });
        }
        flags.raise(step.flag());

        let effect = match step {
            OnboardingStep::CompleteQuestionnaire => Some(Effect::SeedGoals),
            _ => None,
        };
        Ok(Transition {
            from,
            to: self.state(),
            effect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(a: bool, b: bool, c: bool, d: bool) -> OnboardingFlags {
        OnboardingFlags {
            has_completed_onboarding: a,
            has_child: b,
            has_sent_invite: c,
            has_seen_success: d,
        }
    }

    #[test]
    fn precedence_table_holds_for_every_tuple() {
        for bits in 0u8..16 {
            let (a, b, c, d) = (bits & 8 != 0, bits & 4 != 0, bits & 2 != 0, bits & 1 != 0);
            let expected = if !a {
                OnboardingState::NeedsOnboarding
            } else if !b {
                OnboardingState::NeedsChild
            } else if !c {
                OnboardingState::NeedsInvite
            } else if !d {
                OnboardingState::NeedsSuccessAck
            } else {
                OnboardingState::Done
            };
            assert_eq!(
                OnboardingState::from_flags(Some(&flags(a, b, c, d))),
                expected,
                "flags {a} {b} {c} {d}"
            );
        }
    }

    #[test]
    fn unfinished_questionnaire_wins_over_everything_else() {
        let f = flags(false, true, true, true);
        assert_eq!(
            OnboardingState::from_flags(Some(&f)),
            OnboardingState::NeedsOnboarding
        );
    }

    #[test]
    fn missing_flags_means_loading() {
        assert_eq!(OnboardingState::from_flags(None), OnboardingState::Loading);
        assert_eq!(Sequencer::default().state(), OnboardingState::Loading);
    }

    #[test]
    fn advancing_before_load_is_rejected() {
        let mut seq = Sequencer::default();
        let err = seq.advance(OnboardingStep::CompleteQuestionnaire).unwrap_err();
        assert!(matches!(err, OnboardingError::NotLoaded));
    }

    #[test]
    fn full_walk_reaches_done() {
        let mut seq = Sequencer::default();
        seq.load(OnboardingFlags::default());

        let t = seq.advance(OnboardingStep::CompleteQuestionnaire).unwrap();
        assert_eq!(t.from, OnboardingState::NeedsOnboarding);
        assert_eq!(t.to, OnboardingState::NeedsChild);
        assert_eq!(t.effect, Some(Effect::SeedGoals));

        let t = seq.advance(OnboardingStep::AddChild).unwrap();
        assert_eq!(t.to, OnboardingState::NeedsInvite);
        assert_eq!(t.effect, None);

        let t = seq.advance(OnboardingStep::SkipInvite).unwrap();
        assert_eq!(t.to, OnboardingState::NeedsSuccessAck);

        let t = seq.advance(OnboardingStep::DismissSuccess).unwrap();
        assert_eq!(t.to, OnboardingState::Done);
        assert_eq!(seq.flags(), Some(&flags(true, true, true, true)));
    }

    #[test]
    fn steps_cannot_skip_ahead() {
        let mut seq = Sequencer::loaded(flags(true, false, false, false));
        let err = seq.advance(OnboardingStep::SendInvite).unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::UnexpectedStep {
                state: OnboardingState::NeedsChild,
                step: OnboardingStep::SendInvite
            }
        ));
        // nothing was raised
        assert_eq!(seq.flags(), Some(&flags(true, false, false, false)));
    }

    #[test]
    fn questionnaire_cannot_be_repeated() {
        let mut seq = Sequencer::loaded(flags(true, true, true, true));
        assert!(seq.advance(OnboardingStep::CompleteQuestionnaire).is_err());
    }

    #[test]
    fn raise_reports_change_once() {
        let mut f = OnboardingFlags::default();
        assert!(f.raise(OnboardingFlag::SentInvite));
        assert!(!f.raise(OnboardingFlag::SentInvite));
        assert!(f.has_sent_invite);
    }
}
