//! In-process `FamilyStore` used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Acceptance, Child, Family, FamilyStore, Goal, Invite, Minted, NewChild, NewInvite, StoreError,
};
use crate::onboarding::machine::{OnboardingFlag, OnboardingFlags};

struct Template {
    id: Uuid,
    title: &'static str,
    description: &'static str,
    category: &'static str,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, Option<Uuid>>,
    families: HashMap<Uuid, Family>,
    members: HashSet<(Uuid, Uuid)>,
    children: Vec<Child>,
    access: HashSet<(Uuid, Uuid)>,
    invites: Vec<Invite>,
    onboarding: HashMap<Uuid, OnboardingFlags>,
    templates: Vec<Template>,
    goals: Vec<Goal>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency_ms: AtomicU64,
    commit_latency_ms: AtomicU64,
    lose_commits: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let inner = Inner {
            templates: vec![
                Template {
                    id: Uuid::new_v4(),
                    title: "Consistent bedtime",
                    description: "Same bedtime routine in both homes",
                    category: "routine",
                },
                Template {
                    id: Uuid::new_v4(),
                    title: "Homework check-in",
                    description: "Review homework together after school",
                    category: "school",
                },
                Template {
                    id: Uuid::new_v4(),
                    title: "Screen time limits",
                    description: "Agree on daily screen time across households",
                    category: "wellbeing",
                },
            ],
            ..Inner::default()
        };
        Self {
            inner: Mutex::new(inner),
            latency_ms: AtomicU64::new(0),
            commit_latency_ms: AtomicU64::new(0),
            lose_commits: AtomicBool::new(false),
        }
    }

    pub async fn template_count(&self) -> usize {
        self.inner.lock().await.templates.len()
    }

    /// Every call sleeps this long before touching state.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay between `accept_invite` applying its writes and returning,
    /// standing in for a slow commit round-trip.
    pub fn set_commit_latency(&self, latency: Duration) {
        self.commit_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes `accept_invite` apply its writes and then report the commit as lost.
    pub fn lose_commits(&self, on: bool) {
        self.lose_commits.store(on, Ordering::SeqCst);
    }

    pub async fn add_user(&self, user_id: Uuid) {
        self.inner.lock().await.users.entry(user_id).or_insert(None);
    }

    /// Stores an invite verbatim, bypassing the issuer.
    pub async fn put_invite(&self, invite: Invite) {
        self.inner.lock().await.invites.push(invite);
    }

    pub async fn invite_by_code(&self, code: &str) -> Option<Invite> {
        let inner = self.inner.lock().await;
        inner.invites.iter().find(|i| i.code == code).cloned()
    }

    pub async fn invite_count(&self) -> usize {
        self.inner.lock().await.invites.len()
    }

    pub async fn is_member(&self, user_id: Uuid, family_id: Uuid) -> bool {
        self.inner.lock().await.members.contains(&(user_id, family_id))
    }

    async fn pause(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl FamilyStore for MemoryStore {
    async fn family_of(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        self.pause().await;
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).copied().flatten())
    }

    async fn create_family(&self, creator: Uuid, name: &str) -> Result<Family, StoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().await;
        let pointer = inner.users.entry(creator).or_insert(None);
        if pointer.is_some() {
            return Err(StoreError::Conflict("user already belongs to a family".into()));
        }
        let family = Family {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_by: creator,
            created_at: OffsetDateTime::now_utc(),
        };
        *pointer = Some(family.id);
        inner.members.insert((creator, family.id));
        inner.families.insert(family.id, family.clone());
        Ok(family)
    }

    async fn latest_open_invite(&self, inviter_id: Uuid) -> Result<Option<Invite>, StoreError> {
        self.pause().await;
        let inner = self.inner.lock().await;
        Ok(inner
            .invites
            .iter()
            .filter(|i| i.inviter_id == inviter_id && !i.accepted)
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn insert_invite(&self, invite: NewInvite) -> Result<Minted, StoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().await;
        let existing = inner
            .invites
            .iter()
            .filter(|i| {
                i.inviter_id == invite.inviter_id
                    && i.family_id == invite.family_id
                    && i.is_live_at(invite.created_at)
            })
            .max_by_key(|i| i.created_at)
            .cloned();
        if let Some(existing) = existing {
            return Ok(Minted::Existing(existing));
        }
        if inner.invites.iter().any(|i| i.code == invite.code) {
            return Err(StoreError::Conflict("invites_code_key".into()));
        }
        if inner.invites.iter().any(|i| i.token == invite.token) {
            return Err(StoreError::Conflict("invites_token_key".into()));
        }
        let row = Invite {
            id: invite.id,
            token: invite.token,
            code: invite.code,
            family_id: invite.family_id,
            inviter_id: invite.inviter_id,
            created_at: invite.created_at,
            expires_at: invite.expires_at,
            accepted: false,
            accepted_by: None,
            accepted_at: None,
        };
        inner.invites.push(row.clone());
        Ok(Minted::Created(row))
    }

    async fn find_open_invite(&self, code: &str) -> Result<Option<Invite>, StoreError> {
        self.pause().await;
        let inner = self.inner.lock().await;
        Ok(inner
            .invites
            .iter()
            .find(|i| i.code == code && !i.accepted)
            .cloned())
    }

    async fn accept_invite(&self, invite: &Invite, user_id: Uuid) -> Result<Acceptance, StoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().await;

        let now = OffsetDateTime::now_utc();
        let Some(row) = inner
            .invites
            .iter_mut()
            .find(|i| i.id == invite.id && !i.accepted)
        else {
            return Ok(Acceptance::Lost);
        };
        if row.expires_at <= now {
            return Ok(Acceptance::Expired);
        }
        row.accepted = true;
        row.accepted_by = Some(user_id);
        row.accepted_at = Some(now);

        inner.users.insert(user_id, Some(invite.family_id));
        inner.members.insert((user_id, invite.family_id));

        let granted: Vec<Uuid> = inner
            .children
            .iter()
            .filter(|c| c.family_id == invite.family_id)
            .map(|c| c.id)
            .collect();
        for child_id in &granted {
            inner.access.insert((user_id, *child_id));
        }
        drop(inner);

        let commit_ms = self.commit_latency_ms.load(Ordering::SeqCst);
        if commit_ms > 0 {
            tokio::time::sleep(Duration::from_millis(commit_ms)).await;
        }
        if self.lose_commits.load(Ordering::SeqCst) {
            return Err(StoreError::CommitUncertain("connection reset during commit".into()));
        }
        Ok(Acceptance::Accepted { granted_children: granted })
    }

    async fn add_child(&self, child: NewChild) -> Result<Child, StoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().await;
        let row = Child {
            id: child.id,
            family_id: child.family_id,
            name: child.name,
            birth_date: child.birth_date,
            created_by: child.created_by,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.children.push(row.clone());
        inner.access.insert((child.created_by, row.id));
        inner
            .onboarding
            .entry(child.created_by)
            .or_default()
            .raise(OnboardingFlag::HasChild);
        Ok(row)
    }

    async fn children_for(&self, user_id: Uuid) -> Result<Vec<Child>, StoreError> {
        self.pause().await;
        let inner = self.inner.lock().await;
        Ok(inner
            .children
            .iter()
            .filter(|c| inner.access.contains(&(user_id, c.id)))
            .cloned()
            .collect())
    }

    async fn onboarding_flags(&self, user_id: Uuid) -> Result<OnboardingFlags, StoreError> {
        self.pause().await;
        let inner = self.inner.lock().await;
        Ok(inner.onboarding.get(&user_id).copied().unwrap_or_default())
    }

    async fn raise_flag(&self, user_id: Uuid, flag: OnboardingFlag) -> Result<bool, StoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().await;
        Ok(inner.onboarding.entry(user_id).or_default().raise(flag))
    }

    async fn complete_onboarding(&self, user_id: Uuid) -> Result<Option<u64>, StoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().await;
        let flipped = inner
            .onboarding
            .entry(user_id)
            .or_default()
            .raise(OnboardingFlag::CompletedOnboarding);
        if !flipped {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let seeded: Vec<Goal> = inner
            .templates
            .iter()
            .map(|t| Goal {
                id: Uuid::new_v4(),
                user_id,
                template_id: Some(t.id),
                title: t.title.to_string(),
                description: Some(t.description.to_string()),
                category: t.category.to_string(),
                created_at: now,
            })
            .collect();
        let count = seeded.len() as u64;
        inner.goals.extend(seeded);
        Ok(Some(count))
    }

    async fn goals_for(&self, user_id: Uuid) -> Result<Vec<Goal>, StoreError> {
        self.pause().await;
        let inner = self.inner.lock().await;
        Ok(inner
            .goals
            .iter()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }
}
