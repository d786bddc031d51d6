use time::{macros::format_description, Date};
use tracing::info;
use uuid::Uuid;

use super::FamilyError;
use crate::auth::services::Session;
use crate::state::AppState;
use crate::store::{bounded, Child, Family, Goal, NewChild, StoreError};

const MAX_NAME_LEN: usize = 80;

fn clean_name(raw: &str) -> Result<String, FamilyError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(FamilyError::InvalidInput("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(FamilyError::InvalidInput("name is too long"));
    }
    Ok(name.to_string())
}

/// Parses `YYYY-MM-DD`.
pub(crate) fn parse_birth_date(raw: &str) -> Result<Date, FamilyError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| FamilyError::InvalidInput("birth_date must be YYYY-MM-DD"))
}

pub(crate) fn format_birth_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

pub async fn create_family(st: &AppState, session: &Session, name: &str) -> Result<Family, FamilyError> {
    let name = clean_name(name)?;
    if bounded(st.store_timeout(), st.store.family_of(session.user_id)).await?.is_some() {
        return Err(FamilyError::AlreadyInFamily);
    }
    let family = match bounded(st.store_timeout(), st.store.create_family(session.user_id, &name)).await {
        Ok(f) => f,
        Err(StoreError::Conflict(_)) => return Err(FamilyError::AlreadyInFamily),
        Err(e) => return Err(e.into()),
    };
    info!(user_id = %session.user_id, family_id = %family.id, "family created");
    Ok(family)
}

pub async fn add_child(
    st: &AppState,
    session: &Session,
    name: &str,
    birth_date: Option<&str>,
) -> Result<Child, FamilyError> {
    let name = clean_name(name)?;
    let birth_date = birth_date.map(parse_birth_date).transpose()?;
    let family_id = bounded(st.store_timeout(), st.store.family_of(session.user_id))
        .await?
        .ok_or(FamilyError::NotInFamily)?;

    let child = bounded(
        st.store_timeout(),
        st.store.add_child(NewChild {
            id: Uuid::new_v4(),
            family_id,
            name,
            birth_date,
            created_by: session.user_id,
        }),
    )
    .await?;
    info!(user_id = %session.user_id, %family_id, child_id = %child.id, "child added");
    Ok(child)
}

pub async fn list_children(st: &AppState, session: &Session) -> Result<Vec<Child>, FamilyError> {
    Ok(bounded(st.store_timeout(), st.store.children_for(session.user_id)).await?)
}

pub async fn list_goals(st: &AppState, session: &Session) -> Result<Vec<Goal>, FamilyError> {
    Ok(bounded(st.store_timeout(), st.store.goals_for(session.user_id)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::machine::OnboardingFlags;
    use crate::store::FamilyStore;
    use crate::test_support::{memory_state, new_user};
    use time::Month;

    #[tokio::test]
    async fn creator_joins_own_family() {
        let (st, store) = memory_state();
        let user = new_user(&store).await;

        let family = create_family(&st, &user, "  Nguyen family ").await.unwrap();
        assert_eq!(family.name, "Nguyen family");
        assert_eq!(store.family_of(user.user_id).await.unwrap(), Some(family.id));
        assert!(store.is_member(user.user_id, family.id).await);

        let err = create_family(&st, &user, "Second").await.unwrap_err();
        assert!(matches!(err, FamilyError::AlreadyInFamily));
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let (st, store) = memory_state();
        let user = new_user(&store).await;
        let err = create_family(&st, &user, "   ").await.unwrap_err();
        assert!(matches!(err, FamilyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn adding_a_child_needs_a_family() {
        let (st, store) = memory_state();
        let user = new_user(&store).await;
        let err = add_child(&st, &user, "Mia", None).await.unwrap_err();
        assert!(matches!(err, FamilyError::NotInFamily));
    }

    #[tokio::test]
    async fn child_is_visible_to_creator_and_raises_flag() {
        let (st, store) = memory_state();
        let user = new_user(&store).await;
        create_family(&st, &user, "Haddad").await.unwrap();

        let child = add_child(&st, &user, "Mia", Some("2019-04-02")).await.unwrap();
        assert_eq!(child.birth_date, Date::from_calendar_date(2019, Month::April, 2).ok());

        let visible = list_children(&st, &user).await.unwrap();
        assert_eq!(visible, vec![child]);
        let flags = store.onboarding_flags(user.user_id).await.unwrap();
        assert_eq!(
            flags,
            OnboardingFlags {
                has_child: true,
                ..OnboardingFlags::default()
            }
        );
    }

    #[test]
    fn birth_date_parsing() {
        let d = parse_birth_date("2020-12-31").unwrap();
        assert_eq!(format_birth_date(d), "2020-12-31");
        assert!(parse_birth_date("31/12/2020").is_err());
        assert!(parse_birth_date("2020-02-30").is_err());
    }
}
