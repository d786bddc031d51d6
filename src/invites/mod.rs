use crate::state::AppState;
use crate::store::StoreError;
use axum::Router;

pub mod codes;
mod dto;
pub mod handlers;
pub mod issuer;
pub mod redeemer;

pub fn router() -> Router<AppState> {
    handlers::invite_routes()
}

#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    #[error("you need to create or join a family before inviting someone")]
    NotInFamily,

    #[error("invite code is not valid")]
    InvalidCode,

    #[error("invite code has expired")]
    ExpiredCode,

    #[error("you cannot redeem your own invite")]
    OwnInvite,

    #[error("invite was redeemed by someone else")]
    ConcurrentRedemptionLost,

    #[error("redemption may be incomplete: {0}")]
    PartialRedemptionFailure(String),

    #[error("invite service timed out")]
    TimedOut,

    #[error("could not save invite, try again: {0}")]
    Persistence(#[source] StoreError),
}

impl From<StoreError> for InviteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TimedOut(_) => Self::TimedOut,
            StoreError::CommitUncertain(msg) => Self::PartialRedemptionFailure(msg),
            other => Self::Persistence(other),
        }
    }
}
