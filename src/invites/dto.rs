use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::issuer::IssuedInvite;
use super::redeemer::Redemption;

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub reused: bool,
}

impl From<IssuedInvite> for InviteResponse {
    fn from(i: IssuedInvite) -> Self {
        Self {
            code: i.code,
            expires_at: i.expires_at,
            reused: i.reused,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentInviteResponse {
    pub invite: Option<InviteResponse>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub family_id: Uuid,
    pub granted_children: Vec<Uuid>,
}

impl From<Redemption> for RedeemResponse {
    fn from(r: Redemption) -> Self {
        Self {
            family_id: r.family_id,
            granted_children: r.granted_children,
        }
    }
}
