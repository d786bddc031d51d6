use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::InviteError;
use crate::auth::services::Session;
use crate::state::AppState;
use crate::store::{bounded, Invite, Minted, NewInvite, StoreError};

/// Lifetime of every invite, counted from creation.
pub const INVITE_TTL: Duration = Duration::hours(24);

/// Fresh codes tried before giving up on a run of collisions.
pub const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvite {
    pub code: String,
    pub expires_at: OffsetDateTime,
    /// True when an existing live invite was handed back instead of a new one.
    pub reused: bool,
}

impl IssuedInvite {
    fn from_row(invite: Invite, reused: bool) -> Self {
        Self {
            code: invite.code,
            expires_at: invite.expires_at,
            reused,
        }
    }
}

/// Live invite the user issued for the family they are in now, if any.
async fn live_invite(
    st: &AppState,
    inviter_id: Uuid,
    family_id: Uuid,
    now: OffsetDateTime,
) -> Result<Option<Invite>, InviteError> {
    let latest = bounded(st.store_timeout(), st.store.latest_open_invite(inviter_id)).await?;
    Ok(latest.filter(|i| i.family_id == family_id && i.is_live_at(now)))
}

/// Returns the inviter's live code, minting a new invite only when none exists.
pub async fn issue(st: &AppState, session: &Session) -> Result<IssuedInvite, InviteError> {
    let inviter_id = session.user_id;
    let family_id = bounded(st.store_timeout(), st.store.family_of(inviter_id))
        .await?
        .ok_or(InviteError::NotInFamily)?;

    let now = OffsetDateTime::now_utc();
    if let Some(existing) = live_invite(st, inviter_id, family_id, now).await? {
        debug!(%inviter_id, invite_id = %existing.id, "reusing live invite");
        return Ok(IssuedInvite::from_row(existing, true));
    }

    let mut last_conflict = None;
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let new = NewInvite {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().simple().to_string(),
            code: st.codes.next_code(),
            family_id,
            inviter_id,
            created_at: now,
            expires_at: now + INVITE_TTL,
        };
        match bounded(st.store_timeout(), st.store.insert_invite(new)).await {
            Ok(Minted::Created(invite)) => {
                info!(%inviter_id, %family_id, invite_id = %invite.id, "invite issued");
                return Ok(IssuedInvite::from_row(invite, false));
            }
            Ok(Minted::Existing(invite)) => {
                debug!(%inviter_id, invite_id = %invite.id, "concurrent issue already minted");
                return Ok(IssuedInvite::from_row(invite, true));
            }
            Err(StoreError::Conflict(constraint)) => {
                warn!(%inviter_id, attempt, %constraint, "invite code collision");
                last_conflict = Some(constraint);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(InviteError::Persistence(StoreError::Conflict(format!(
        "no free invite code after {MAX_CODE_ATTEMPTS} attempts ({})",
        last_conflict.unwrap_or_default()
    ))))
}

/// The live invite for the "share your code" screen, without minting one.
pub async fn current(st: &AppState, session: &Session) -> Result<Option<IssuedInvite>, InviteError> {
    let Some(family_id) = bounded(st.store_timeout(), st.store.family_of(session.user_id)).await?
    else {
        return Ok(None);
    };
    let now = OffsetDateTime::now_utc();
    Ok(live_invite(st, session.user_id, family_id, now)
        .await?
        .map(|i| IssuedInvite::from_row(i, true)))
}
