//! Fixtures shared by the unit tests.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::services::Session;
use crate::invites::codes::{CodeSource, RandomCodes, ScriptedCodes};
use crate::state::AppState;
use crate::store::{memory::MemoryStore, FamilyStore, NewChild};

pub fn memory_state() -> (AppState, Arc<MemoryStore>) {
    memory_state_with_codes(Arc::new(RandomCodes))
}

pub fn scripted_state(codes: &[&str]) -> (AppState, Arc<MemoryStore>) {
    memory_state_with_codes(Arc::new(ScriptedCodes::new(codes)))
}

fn memory_state_with_codes(codes: Arc<dyn CodeSource>) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::with_store(store.clone() as Arc<dyn FamilyStore>, codes);
    (state, store)
}

pub async fn new_user(store: &MemoryStore) -> Session {
    let user_id = Uuid::new_v4();
    store.add_user(user_id).await;
    Session { user_id }
}

/// A user who created a family holding `children` children.
pub async fn parent_with_children(store: &MemoryStore, children: usize) -> (Session, Uuid) {
    let parent = new_user(store).await;
    let family = store
        .create_family(parent.user_id, "Rivera household")
        .await
        .expect("create family");
    for n in 0..children {
        add_child(store, &parent, family.id, &format!("child-{n}")).await;
    }
    (parent, family.id)
}

pub async fn add_child(store: &MemoryStore, by: &Session, family_id: Uuid, name: &str) -> Uuid {
    store
        .add_child(NewChild {
            id: Uuid::new_v4(),
            family_id,
            name: name.to_string(),
            birth_date: None,
            created_by: by.user_id,
        })
        .await
        .expect("add child")
        .id
}
