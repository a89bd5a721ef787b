//! Catalog access and the coarse candidate gate
//!
//! The engine never owns the catalog. It reads a snapshot through
//! [`CatalogProvider`] on every step and only ever writes the play bonus.

use crate::error::Result;
use crate::types::{Classification, Gate, Item, ItemId, SummaryTag, Tag, TagType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read access to the item catalog
pub trait CatalogProvider {
    /// Items admissible under `gate`
    fn list_candidates(&self, gate: Gate) -> Result<Vec<Item>>;

    fn list_tags(&self) -> Result<Vec<Tag>>;

    fn list_summaries(&self) -> Result<Vec<SummaryTag>>;

    /// Add a one-time popularity bonus after a successful reveal
    fn add_play_bonus(&self, id: ItemId, amount: u64) -> Result<()>;

    fn has_tag(&self, id: ItemId, tag_key: &str) -> Result<bool> {
        Ok(self
            .list_candidates(Gate::Either)?
            .iter()
            .any(|item| item.id == id && item.has_tag(tag_key)))
    }
}

/// Whether an item with `classification` passes `gate`
pub fn admits(gate: Gate, classification: Classification) -> bool {
    match gate {
        Gate::Either => true,
        Gate::Include => classification == Classification::Generated,
        Gate::Exclude => classification != Classification::Generated,
    }
}

/// Narrow a candidate list to the items compatible with the gate
pub fn filter_candidates(items: Vec<Item>, gate: Gate) -> Vec<Item> {
    items.into_iter().filter(|item| admits(gate, item.classification)).collect()
}

/// A complete catalog, as stored on disk or held in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub items: Vec<Item>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub summaries: Vec<SummaryTag>,
}

impl Catalog {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One step's view of the catalog: the gated candidates indexed by id,
/// plus the question vocabulary
#[derive(Debug, Clone)]
pub struct CatalogView {
    items: BTreeMap<ItemId, Item>,
    explore_tags: Vec<String>,
    summaries: Vec<SummaryTag>,
}

impl CatalogView {
    /// Read the gated candidates and the tag vocabulary from a provider
    pub fn load<C: CatalogProvider + ?Sized>(catalog: &C, gate: Gate) -> Result<Self> {
        let items = filter_candidates(catalog.list_candidates(gate)?, gate);
        Ok(Self::new(items, catalog.list_tags()?, catalog.list_summaries()?))
    }

    pub fn new(items: Vec<Item>, tags: Vec<Tag>, mut summaries: Vec<SummaryTag>) -> Self {
        let mut explore_tags: Vec<String> = tags
            .into_iter()
            .filter(|t| t.tag_type != TagType::Structural)
            .map(|t| t.key)
            .collect();
        explore_tags.sort();
        explore_tags.dedup();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));

        Self {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
            explore_tags,
            summaries,
        }
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Non-structural tag keys, ascending
    pub fn explore_tags(&self) -> &[String] {
        &self.explore_tags
    }

    /// Summary groupings, ascending by key
    pub fn summaries(&self) -> &[SummaryTag] {
        &self.summaries
    }

    /// Items missing from the view carry no tags
    pub fn has_tag(&self, id: ItemId, key: &str) -> bool {
        self.items.get(&id).map(|item| item.has_tag(key)).unwrap_or(false)
    }

    pub fn has_any_tag(&self, id: ItemId, keys: &[String]) -> bool {
        self.items.get(&id).map(|item| item.has_any_tag(keys)).unwrap_or(false)
    }
}
