use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::services::format_birth_date;
use crate::store::{Child, Family, Goal};

#[derive(Debug, Deserialize)]
pub struct CreateFamilyRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct FamilyResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Family> for FamilyResponse {
    fn from(f: Family) -> Self {
        Self {
            id: f.id,
            name: f.name,
            created_at: f.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<String>, // YYYY-MM-DD
}

#[derive(Debug, Serialize)]
pub struct ChildResponse {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub birth_date: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Child> for ChildResponse {
    fn from(c: Child) -> Self {
        Self {
            id: c.id,
            family_id: c.family_id,
            name: c.name,
            birth_date: c.birth_date.map(format_birth_date),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GoalResponse {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Goal> for GoalResponse {
    fn from(g: Goal) -> Self {
        Self {
            id: g.id,
            template_id: g.template_id,
            title: g.title,
            description: g.description,
            category: g.category,
            created_at: g.created_at,
        }
    }
}
