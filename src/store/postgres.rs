use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{
    Acceptance, Child, Family, FamilyStore, Goal, Invite, Minted, NewChild, NewInvite, StoreError,
};
use crate::onboarding::machine::{OnboardingFlag, OnboardingFlags};

#[derive(Clone)]
pub struct PgFamilyStore {
    db: PgPool,
}

impl PgFamilyStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn conflict_or_db(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
        }
        _ => StoreError::Database(e),
    }
}

/// Monotonic flag upsert; affects one row only when the flag was false.
async fn raise_flag_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    flag: OnboardingFlag,
) -> Result<bool, StoreError> {
    let col = flag.column();
    let sql = format!(
        r#"
        INSERT INTO onboarding_status (user_id, {col})
        VALUES ($1, true)
        ON CONFLICT (user_id) DO UPDATE
           SET {col} = true, updated_at = now()
         WHERE onboarding_status.{col} = false
        "#
    );
    let res = sqlx::query(&sql).bind(user_id).execute(&mut **tx).await?;
    Ok(res.rows_affected() == 1)
}

#[async_trait]
impl FamilyStore for PgFamilyStore {
    async fn family_of(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query_scalar::<_, Option<Uuid>>(
            r#"SELECT family_id FROM users WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.flatten())
    }

    async fn create_family(&self, creator: Uuid, name: &str) -> Result<Family, StoreError> {
        let mut tx = self.db.begin().await?;

        let family = sqlx::query_as::<_, Family>(
            r#"
            INSERT INTO families (id, name, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, name, created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(creator)
        .fetch_one(&mut *tx)
        .await?;

        let pointed = sqlx::query(
            r#"UPDATE users SET family_id = $2 WHERE id = $1 AND family_id IS NULL"#,
        )
        .bind(creator)
        .bind(family.id)
        .execute(&mut *tx)
        .await?;
        if pointed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict("user already belongs to a family".into()));
        }

        sqlx::query(r#"INSERT INTO family_members (user_id, family_id) VALUES ($1, $2)"#)
            .bind(creator)
            .bind(family.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(family)
    }

    async fn latest_open_invite(&self, inviter_id: Uuid) -> Result<Option<Invite>, StoreError> {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token, code, family_id, inviter_id, created_at, expires_at,
                   accepted, accepted_by, accepted_at
              FROM invites
             WHERE inviter_id = $1 AND accepted = false
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(inviter_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(invite)
    }

    async fn insert_invite(&self, invite: NewInvite) -> Result<Minted, StoreError> {
        let mut tx = self.db.begin().await?;

        // Serialises concurrent issuers acting for the same inviter.
        sqlx::query(r#"SELECT id FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(invite.inviter_id)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token, code, family_id, inviter_id, created_at, expires_at,
                   accepted, accepted_by, accepted_at
              FROM invites
             WHERE inviter_id = $1 AND family_id = $2
               AND accepted = false AND expires_at > $3
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(invite.inviter_id)
        .bind(invite.family_id)
        .bind(invite.created_at)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(existing) = existing {
            tx.rollback().await?;
            return Ok(Minted::Existing(existing));
        }

        let row = sqlx::query_as::<_, Invite>(
            r#"
            INSERT INTO invites (id, token, code, family_id, inviter_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, token, code, family_id, inviter_id, created_at, expires_at,
                      accepted, accepted_by, accepted_at
            "#,
        )
        .bind(invite.id)
        .bind(&invite.token)
        .bind(&invite.code)
        .bind(invite.family_id)
        .bind(invite.inviter_id)
        .bind(invite.created_at)
        .bind(invite.expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_or_db)?;

        tx.commit().await?;
        Ok(Minted::Created(row))
    }

    async fn find_open_invite(&self, code: &str) -> Result<Option<Invite>, StoreError> {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, token, code, family_id, inviter_id, created_at, expires_at,
                   accepted, accepted_by, accepted_at
              FROM invites
             WHERE code = $1 AND accepted = false
            "#,
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;
        Ok(invite)
    }

    async fn accept_invite(&self, invite: &Invite, user_id: Uuid) -> Result<Acceptance, StoreError> {
        let mut tx = self.db.begin().await?;

        // Claim first: the row lock taken here serialises concurrent redeemers.
        let claimed = sqlx::query(
            r#"
            UPDATE invites
               SET accepted = true, accepted_by = $2, accepted_at = now()
             WHERE id = $1 AND accepted = false AND expires_at > now()
            "#,
        )
        .bind(invite.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            let accepted = sqlx::query_scalar::<_, bool>(
                r#"SELECT accepted FROM invites WHERE id = $1"#,
            )
            .bind(invite.id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;
            return Ok(match accepted {
                Some(false) => Acceptance::Expired,
                _ => Acceptance::Lost,
            });
        }

        sqlx::query(r#"UPDATE users SET family_id = $2 WHERE id = $1"#)
            .bind(user_id)
            .bind(invite.family_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO family_members (user_id, family_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, family_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(invite.family_id)
        .execute(&mut *tx)
        .await?;

        let children = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT id FROM children WHERE family_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(invite.family_id)
        .fetch_all(&mut *tx)
        .await?;

        for child_id in &children {
            sqlx::query(
                r#"
                INSERT INTO child_access (user_id, child_id)
                VALUES ($1, $2)
                ON CONFLICT (user_id, child_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(*child_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::CommitUncertain(e.to_string()))?;

        debug!(invite_id = %invite.id, %user_id, granted = children.len(), "invite accepted");
        Ok(Acceptance::Accepted { granted_children: children })
    }

    async fn add_child(&self, child: NewChild) -> Result<Child, StoreError> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, Child>(
            r#"
            INSERT INTO children (id, family_id, name, birth_date, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, family_id, name, birth_date, created_by, created_at
            "#,
        )
        .bind(child.id)
        .bind(child.family_id)
        .bind(&child.name)
        .bind(child.birth_date)
        .bind(child.created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(r#"INSERT INTO child_access (user_id, child_id) VALUES ($1, $2)"#)
            .bind(child.created_by)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        raise_flag_tx(&mut tx, child.created_by, OnboardingFlag::HasChild).await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn children_for(&self, user_id: Uuid) -> Result<Vec<Child>, StoreError> {
        let rows = sqlx::query_as::<_, Child>(
            r#"
            SELECT c.id, c.family_id, c.name, c.birth_date, c.created_by, c.created_at
              FROM children c
              JOIN child_access a ON a.child_id = c.id
             WHERE a.user_id = $1
             ORDER BY c.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn onboarding_flags(&self, user_id: Uuid) -> Result<OnboardingFlags, StoreError> {
        let flags = sqlx::query_as::<_, OnboardingFlags>(
            r#"
            SELECT has_completed_onboarding, has_child, has_sent_invite, has_seen_success
              FROM onboarding_status
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(flags.unwrap_or_default())
    }

    async fn raise_flag(&self, user_id: Uuid, flag: OnboardingFlag) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await?;
        let changed = raise_flag_tx(&mut tx, user_id, flag).await?;
        tx.commit().await?;
        Ok(changed)
    }

    async fn complete_onboarding(&self, user_id: Uuid) -> Result<Option<u64>, StoreError> {
        let mut tx = self.db.begin().await?;

        if !raise_flag_tx(&mut tx, user_id, OnboardingFlag::CompletedOnboarding).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let seeded = sqlx::query(
            r#"
            INSERT INTO goals (id, user_id, template_id, title, description, category)
            SELECT gen_random_uuid(), $1, t.id, t.title, t.description, t.category
              FROM goal_templates t
             ORDER BY t.position ASC
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(seeded.rows_affected()))
    }

    async fn goals_for(&self, user_id: Uuid) -> Result<Vec<Goal>, StoreError> {
        let rows = sqlx::query_as::<_, Goal>(
            r#"
            SELECT id, user_id, template_id, title, description, category, created_at
              FROM goals
             WHERE user_id = $1
             ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
