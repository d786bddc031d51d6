use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::onboarding::machine::{OnboardingFlag, OnboardingFlags};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgFamilyStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store call did not finish within {0:?}")]
    TimedOut(Duration),

    /// The transaction was sent for commit but the result never came back,
    /// so it may or may not have been applied.
    #[error("commit outcome unknown: {0}")]
    CommitUncertain(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Invite row. `accepted` flips to true exactly once.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Invite {
    pub id: Uuid,
    pub token: String,
    pub code: String,
    pub family_id: Uuid,
    pub inviter_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub accepted: bool,
    pub accepted_by: Option<Uuid>,
    pub accepted_at: Option<OffsetDateTime>,
}

impl Invite {
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        !self.accepted && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub id: Uuid,
    pub token: String,
    pub code: String,
    pub family_id: Uuid,
    pub inviter_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Family {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Child {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub birth_date: Option<Date>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewChild {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub birth_date: Option<Date>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, FromRow)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub created_at: OffsetDateTime,
}

/// Result of the compare-and-swap on an invite's accepted flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// This caller flipped the flag; the listed children were granted.
    Accepted { granted_children: Vec<Uuid> },
    /// Someone else flipped it first. Nothing was written.
    Lost,
    /// The invite ran out between lookup and claim. Nothing was written.
    Expired,
}

/// Outcome of [`FamilyStore::insert_invite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Minted {
    Created(Invite),
    /// A live invite for the same inviter and family already existed.
    Existing(Invite),
}

/// Persistence seam for the family, invite and onboarding flows.
#[async_trait]
pub trait FamilyStore: Send + Sync {
    /// The user's current family pointer. `None` for unknown users too.
    async fn family_of(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError>;

    /// Creates a family, points the creator at it and records the membership.
    /// Fails with `Conflict` when the creator already has a family.
    async fn create_family(&self, creator: Uuid, name: &str) -> Result<Family, StoreError>;

    /// Most recent unaccepted invite issued by `inviter_id`, expired or not.
    async fn latest_open_invite(&self, inviter_id: Uuid) -> Result<Option<Invite>, StoreError>;

    /// Inserts the invite unless the inviter already holds a live one for the
    /// same family, checked while holding the inviter's row lock.
    /// Fails with `Conflict` on a token or code collision.
    async fn insert_invite(&self, invite: NewInvite) -> Result<Minted, StoreError>;

    /// Exact-match lookup restricted to `accepted = false`.
    async fn find_open_invite(&self, code: &str) -> Result<Option<Invite>, StoreError>;

    /// Atomically claims the invite for `user_id`, moves the user into the
    /// invite's family, records the membership and grants access to every
    /// child the family has at this instant. The claim only succeeds while
    /// the invite is unaccepted and unexpired.
    async fn accept_invite(&self, invite: &Invite, user_id: Uuid) -> Result<Acceptance, StoreError>;

    /// Inserts the child, grants its creator access and raises `has_child`.
    async fn add_child(&self, child: NewChild) -> Result<Child, StoreError>;

    /// Children the user holds an access grant for.
    async fn children_for(&self, user_id: Uuid) -> Result<Vec<Child>, StoreError>;

    /// All-false when the user has no stored status yet.
    async fn onboarding_flags(&self, user_id: Uuid) -> Result<OnboardingFlags, StoreError>;

    /// Sets one flag to true. Returns whether it was false before.
    async fn raise_flag(&self, user_id: Uuid, flag: OnboardingFlag) -> Result<bool, StoreError>;

    /// Raises `has_completed_onboarding` and, only if that flipped the flag,
    /// clones the goal templates into the user's goals. Returns the number
    /// of goals seeded, or `None` when the flag was already set.
    async fn complete_onboarding(&self, user_id: Uuid) -> Result<Option<u64>, StoreError>;

    async fn goals_for(&self, user_id: Uuid) -> Result<Vec<Goal>, StoreError>;
}

/// Runs a store call under a deadline.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::TimedOut(limit)),
    }
}
