use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{codes::looks_like_code, InviteError};
use crate::auth::services::Session;
use crate::state::AppState;
use crate::store::{bounded, Acceptance, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub family_id: Uuid,
    /// Children that existed in the family when the invite was accepted.
    pub granted_children: Vec<Uuid>,
}

/// Joins the session user to the family behind `code`.
///
/// Lookup and expiry are checked first; the claim of the invite, the move into
/// the family and the child grants then happen as one atomic store call whose
/// first action is a compare-and-swap on `accepted` that also re-checks expiry.
pub async fn redeem(st: &AppState, session: &Session, code: &str) -> Result<Redemption, InviteError> {
    let user_id = session.user_id;
    let code = code.trim();
    if !looks_like_code(code) {
        return Err(InviteError::InvalidCode);
    }

    let invite = bounded(st.store_timeout(), st.store.find_open_invite(code))
        .await?
        .ok_or(InviteError::InvalidCode)?;

    if invite.expires_at <= OffsetDateTime::now_utc() {
        info!(%user_id, invite_id = %invite.id, "expired invite presented");
        return Err(InviteError::ExpiredCode);
    }

    if invite.inviter_id == user_id {
        return Err(InviteError::OwnInvite);
    }

    match bounded(st.store_timeout(), st.store.accept_invite(&invite, user_id)).await {
        Ok(Acceptance::Accepted { granted_children }) => {
            info!(
                %user_id,
                family_id = %invite.family_id,
                invite_id = %invite.id,
                granted = granted_children.len(),
                "invite redeemed"
            );
            Ok(Redemption {
                family_id: invite.family_id,
                granted_children,
            })
        }
        Ok(Acceptance::Expired) => {
            info!(%user_id, invite_id = %invite.id, "invite expired before it was claimed");
            Err(InviteError::ExpiredCode)
        }
        Ok(Acceptance::Lost) => {
            warn!(%user_id, invite_id = %invite.id, "invite claimed by a concurrent redemption");
            Err(InviteError::ConcurrentRedemptionLost)
        }
        // The deadline may fire with the commit already sent.
        Err(err @ (StoreError::CommitUncertain(_) | StoreError::TimedOut(_))) => {
            let msg = err.to_string();
            error!(
                %user_id,
                family_id = %invite.family_id,
                invite_id = %invite.id,
                error = %msg,
                "redemption commit outcome unknown, needs reconciliation"
            );
            Err(InviteError::PartialRedemptionFailure(msg))
        }
        Err(e) => Err(e.into()),
    }
}
