//! SQLite storage for the catalog and session aggregates
//!
//! Single file, no server. Sessions are stored whole as JSON next to a
//! version column used for optimistic concurrency.

use crate::catalog::{filter_candidates, Catalog, CatalogProvider};
use crate::error::{EngineError, Result};
use crate::repository::SessionRepository;
use crate::session::Session;
use crate::types::{Classification, Gate, Item, ItemId, SummaryTag, Tag, TagRef, TagType};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const SCHEMA: &str = r#"
-- Items: the things a player can think of
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT,
    base_popularity INTEGER NOT NULL DEFAULT 0,
    play_bonus INTEGER NOT NULL DEFAULT 0,
    classification TEXT NOT NULL DEFAULT 'unknown'
);

CREATE TABLE IF NOT EXISTS tags (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    tag_type TEXT NOT NULL DEFAULT 'official',
    category TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS item_tags (
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    tag_key TEXT NOT NULL,
    weight REAL,
    PRIMARY KEY (item_id, tag_key)
);

CREATE INDEX IF NOT EXISTS idx_item_tags_key ON item_tags(tag_key);

-- Summaries: OR-groups of tags asked as one question
CREATE TABLE IF NOT EXISTS summaries (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    members_json TEXT NOT NULL
);

-- Sessions: whole aggregate as JSON, version for optimistic concurrency
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    gate TEXT NOT NULL,
    state TEXT NOT NULL,
    version INTEGER NOT NULL,
    body_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state);
"#;

/// SQLite integers are signed; counts above `i64::MAX` are refused
fn to_sql_int(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| EngineError::ValueOutOfRange(value))
}

/// Read a column that must hold a non-negative integer
fn unsigned_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

/// Open (creating if needed) a database file with the schema applied
pub fn init_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Session counts per state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub total: u64,
    pub by_state: BTreeMap<String, u64>,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { conn: init_db(path)? })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Replace the whole catalog in one transaction
    pub fn replace_catalog(&self, catalog: &Catalog) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch("DELETE FROM item_tags; DELETE FROM items; DELETE FROM tags; DELETE FROM summaries;")?;

        {
            let mut insert_item = tx.prepare(
                "INSERT INTO items (id, title, author, base_popularity, play_bonus, classification)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_item_tag = tx.prepare(
                "INSERT OR IGNORE INTO item_tags (item_id, tag_key, weight) VALUES (?1, ?2, ?3)",
            )?;
            for item in &catalog.items {
                let id = to_sql_int(item.id)?;
                insert_item.execute(params![
                    id,
                    item.title,
                    item.author,
                    to_sql_int(item.base_popularity)?,
                    to_sql_int(item.play_bonus)?,
                    item.classification.as_str(),
                ])?;
                for tag in &item.tags {
                    insert_item_tag.execute(params![id, tag.key, tag.weight])?;
                }
            }

            let mut insert_tag = tx.prepare(
                "INSERT OR REPLACE INTO tags (key, name, tag_type, category) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for tag in &catalog.tags {
                insert_tag.execute(params![tag.key, tag.name, tag.tag_type.as_str(), tag.category])?;
            }

            let mut insert_summary = tx.prepare(
                "INSERT OR REPLACE INTO summaries (key, name, members_json) VALUES (?1, ?2, ?3)",
            )?;
            for summary in &catalog.summaries {
                insert_summary.execute(params![
                    summary.key,
                    summary.name,
                    serde_json::to_string(&summary.members)?,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Read the full catalog back
    pub fn catalog(&self) -> Result<Catalog> {
        Ok(Catalog {
            items: self.load_items()?,
            tags: self.list_tags()?,
            summaries: self.list_summaries()?,
        })
    }

    fn load_items(&self) -> Result<Vec<Item>> {
        let mut tags_by_item: HashMap<ItemId, Vec<TagRef>> = HashMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, tag_key, weight FROM item_tags ORDER BY item_id, tag_key")?;
        let rows = stmt.query_map([], |row| {
            Ok((unsigned_column(row, 0)?, row.get::<_, String>(1)?, row.get::<_, Option<f64>>(2)?))
        })?;
        for row in rows {
            let (item_id, key, weight) = row?;
            tags_by_item
                .entry(item_id)
                .or_default()
                .push(TagRef { key, weight });
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, title, author, base_popularity, play_bonus, classification
             FROM items ORDER BY id",
        )?;
        let items = stmt
            .query_map([], |row| {
                Ok(Item {
                    id: unsigned_column(row, 0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    base_popularity: unsigned_column(row, 3)?,
                    play_bonus: unsigned_column(row, 4)?,
                    classification: Classification::parse(&row.get::<_, String>(5)?),
                    tags: Vec::new(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items
            .into_iter()
            .map(|mut item| {
                item.tags = tags_by_item.remove(&item.id).unwrap_or_default();
                item
            })
            .collect())
    }

    pub fn session_stats(&self) -> Result<SessionStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM sessions GROUP BY state ORDER BY state")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, unsigned_column(row, 1)?)))?;

        let mut stats = SessionStats::default();
        for row in rows {
            let (state, count) = row?;
            stats.total += count;
            stats.by_state.insert(state, count);
        }
        Ok(stats)
    }
}

impl CatalogProvider for SqliteStore {
    fn list_candidates(&self, gate: Gate) -> Result<Vec<Item>> {
        Ok(filter_candidates(self.load_items()?, gate))
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, name, tag_type, category FROM tags ORDER BY key")?;
        let tags = stmt
            .query_map([], |row| {
                Ok(Tag {
                    key: row.get(0)?,
                    name: row.get(1)?,
                    tag_type: TagType::parse(&row.get::<_, String>(2)?),
                    category: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn list_summaries(&self) -> Result<Vec<SummaryTag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, name, members_json FROM summaries ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, name, members_json)| {
                Ok(SummaryTag { key, name, members: serde_json::from_str(&members_json)? })
            })
            .collect()
    }

    fn add_play_bonus(&self, id: ItemId, amount: u64) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET play_bonus = play_bonus + ?2 WHERE id = ?1",
            params![to_sql_int(id)?, to_sql_int(amount)?],
        )?;
        Ok(())
    }

    fn has_tag(&self, id: ItemId, tag_key: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM item_tags WHERE item_id = ?1 AND tag_key = ?2",
                params![to_sql_int(id)?, tag_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl SessionRepository for SqliteStore {
    fn create(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, gate, state, version, body_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.gate.as_str(),
                session.state.label(),
                to_sql_int(session.version)?,
                serde_json::to_string(session)?,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Session> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body_json FROM sessions WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let body = body.ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn update(&self, session: &mut Session) -> Result<()> {
        let mut next = session.clone();
        next.version += 1;
        next.updated_at = Utc::now();

        let changed = self.conn.execute(
            "UPDATE sessions SET state = ?2, version = ?3, body_json = ?4, updated_at = ?5
             WHERE id = ?1 AND version = ?6",
            params![
                next.id,
                next.state.label(),
                to_sql_int(next.version)?,
                serde_json::to_string(&next)?,
                next.updated_at.to_rfc3339(),
                to_sql_int(session.version)?,
            ],
        )?;

        if changed == 0 {
            let exists: Option<i64> = self
                .conn
                .query_row("SELECT version FROM sessions WHERE id = ?1", [&session.id], |row| row.get(0))
                .optional()?;
            return Err(match exists {
                Some(_) => EngineError::StaleSession { id: session.id.clone(), expected: session.version },
                None => EngineError::SessionNotFound(session.id.clone()),
            });
        }

        *session = next;
        Ok(())
    }
}
