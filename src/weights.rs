//! Weight vectors and popularity-based initialization

use crate::error::{EngineError, Result};
use crate::types::{Item, ItemId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Unnormalized, non-negative mass per candidate, ordered by id.
///
/// Entries are never removed: a penalized item keeps its (negligible) weight.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<ItemId, f64>);

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ItemId) -> Option<f64> {
        self.0.get(&id).copied()
    }

    /// Set a weight, clamping negatives and NaN to zero
    pub fn set(&mut self, id: ItemId, weight: f64) {
        let weight = if weight.is_nan() { 0.0 } else { weight.max(0.0) };
        self.0.insert(id, weight);
    }

    /// Multiply one entry in place; unknown ids are ignored
    pub fn scale(&mut self, id: ItemId, factor: f64) {
        if let Some(w) = self.0.get_mut(&id) {
            *w = (*w * factor).max(0.0);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, f64)> + '_ {
        self.0.iter().map(|(id, w)| (*id, *w))
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// SHA-256 over ids and exact f64 bit patterns
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, w) in &self.0 {
            hasher.update(id.to_le_bytes());
            hasher.update(w.to_bits().to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<(ItemId, f64)> for WeightVector {
    fn from_iter<T: IntoIterator<Item = (ItemId, f64)>>(iter: T) -> Self {
        let mut weights = WeightVector::new();
        for (id, w) in iter {
            weights.set(id, w);
        }
        weights
    }
}

/// Initial weight for one popularity score: `(popularity + epsilon)^alpha`
pub fn initial_weight(popularity: u64, epsilon: f64, alpha: f64) -> f64 {
    (popularity as f64 + epsilon).powf(alpha)
}

/// Build the starting weight vector for a gated candidate set
pub fn initialize(candidates: &[Item], epsilon: f64, alpha: f64) -> Result<WeightVector> {
    if candidates.is_empty() {
        return Err(EngineError::EmptyCatalog);
    }

    Ok(candidates
        .iter()
        .map(|item| (item.id, initial_weight(item.popularity(), epsilon, alpha)))
        .collect())
}
