//! Storage ports and their in-memory implementations
//!
//! The engine talks to storage only through [`SessionRepository`] and
//! [`CatalogProvider`]. The in-memory versions back the tests and the
//! simulator; [`crate::db::SqliteStore`] is the durable implementation.

use crate::catalog::{filter_candidates, Catalog, CatalogProvider};
use crate::error::{EngineError, Result};
use crate::session::Session;
use crate::types::{Gate, Item, ItemId, SummaryTag, Tag};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Persistence for whole session aggregates
pub trait SessionRepository {
    fn create(&self, session: &Session) -> Result<()>;

    fn get(&self, id: &str) -> Result<Session>;

    /// Store the aggregate if nobody else updated it since it was read.
    /// On success `session.version` is bumped; on conflict nothing is written
    /// and `StaleSession` is returned.
    fn update(&self, session: &mut Session) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemorySessions {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRepository for InMemorySessions {
    fn create(&self, session: &Session) -> Result<()> {
        lock(&self.sessions).insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Session> {
        lock(&self.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    fn update(&self, session: &mut Session) -> Result<()> {
        let mut sessions = lock(&self.sessions);
        let stored = sessions
            .get_mut(&session.id)
            .ok_or_else(|| EngineError::SessionNotFound(session.id.clone()))?;

        if stored.version != session.version {
            return Err(EngineError::StaleSession {
                id: session.id.clone(),
                expected: session.version,
            });
        }

        session.version += 1;
        session.updated_at = Utc::now();
        *stored = session.clone();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    catalog: Mutex<Catalog>,
}

impl InMemoryCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog: Mutex::new(catalog) }
    }

    pub fn snapshot(&self) -> Catalog {
        lock(&self.catalog).clone()
    }
}

impl CatalogProvider for InMemoryCatalog {
    fn list_candidates(&self, gate: Gate) -> Result<Vec<Item>> {
        let mut items = filter_candidates(lock(&self.catalog).items.clone(), gate);
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(lock(&self.catalog).tags.clone())
    }

    fn list_summaries(&self) -> Result<Vec<SummaryTag>> {
        Ok(lock(&self.catalog).summaries.clone())
    }

    fn add_play_bonus(&self, id: ItemId, amount: u64) -> Result<()> {
        if let Some(item) = lock(&self.catalog).items.iter_mut().find(|item| item.id == id) {
            item.play_bonus = item.play_bonus.saturating_add(amount);
        }
        Ok(())
    }

    fn has_tag(&self, id: ItemId, tag_key: &str) -> Result<bool> {
        Ok(lock(&self.catalog)
            .items
            .iter()
            .any(|item| item.id == id && item.has_tag(tag_key)))
    }
}
