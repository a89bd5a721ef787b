//! Probability, confidence and diversity metrics
//!
//! Probabilities are always derived from a [`WeightVector`] and never stored.
//! Wherever a "top candidate" is needed the order is probability descending,
//! then id ascending.

use crate::error::{EngineError, Result};
use crate::types::ItemId;
use crate::weights::WeightVector;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Read-only normalized distribution over the candidate set
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(BTreeMap<ItemId, f64>);

impl ProbabilityVector {
    pub fn get(&self, id: ItemId) -> f64 {
        self.0.get(&id).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, f64)> + '_ {
        self.0.iter().map(|(id, p)| (*id, *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }
}

/// A candidate with its current probability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankedCandidate {
    pub id: ItemId,
    pub probability: f64,
}

/// `(probability desc, id asc)`
pub fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then_with(|| a.id.cmp(&b.id))
}

/// `p_i = w_i / Σw`
pub fn normalize(weights: &WeightVector) -> Result<ProbabilityVector> {
    let total = weights.total();
    if !(total.is_finite() && total > 0.0) {
        return Err(EngineError::DegenerateWeights(total));
    }
    Ok(ProbabilityVector(weights.iter().map(|(id, w)| (id, w / total)).collect()))
}

/// Best candidate overall
pub fn top_candidate(probs: &ProbabilityVector) -> Option<RankedCandidate> {
    probs
        .iter()
        .map(|(id, probability)| RankedCandidate { id, probability })
        .min_by(rank_order)
}

/// Best candidate outside `rejected`
pub fn top_eligible(probs: &ProbabilityVector, rejected: &BTreeSet<ItemId>) -> Option<RankedCandidate> {
    probs
        .iter()
        .filter(|(id, _)| !rejected.contains(id))
        .map(|(id, probability)| RankedCandidate { id, probability })
        .min_by(rank_order)
}

/// Maximum probability, 0 for an empty distribution
pub fn confidence(probs: &ProbabilityVector) -> f64 {
    top_candidate(probs).map(|c| c.probability).unwrap_or(0.0)
}

/// Inverse Simpson index `1 / Σp²`; equals n for a uniform distribution
/// over n items and 1 for a point mass
pub fn effective_candidates(probs: &ProbabilityVector) -> f64 {
    let concentration: f64 = probs.iter().map(|(_, p)| p * p).sum();
    if concentration > 0.0 {
        1.0 / concentration
    } else {
        0.0
    }
}

/// Shannon entropy in bits over any non-negative mass (normalized internally)
pub fn entropy_of<I: IntoIterator<Item = f64>>(masses: I) -> f64 {
    let masses: Vec<f64> = masses.into_iter().filter(|m| *m > 0.0).collect();
    let total: f64 = masses.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    masses
        .iter()
        .map(|m| {
            let p = m / total;
            -p * p.log2()
        })
        .sum()
}

pub fn entropy(probs: &ProbabilityVector) -> f64 {
    entropy_of(probs.iter().map(|(_, p)| p))
}

/// Up to `limit` candidates outside `rejected`, best first
pub fn ranked(probs: &ProbabilityVector, rejected: &BTreeSet<ItemId>, limit: usize) -> Vec<RankedCandidate> {
    let mut all: Vec<RankedCandidate> = probs
        .iter()
        .filter(|(id, _)| !rejected.contains(id))
        .map(|(id, probability)| RankedCandidate { id, probability })
        .collect();
    all.sort_by(rank_order);
    all.truncate(limit);
    all
}

/// Summary metrics reported with every turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    pub confidence: f64,
    pub effective_candidates: f64,
    pub entropy_bits: f64,
}

impl Metrics {
    pub fn of(probs: &ProbabilityVector) -> Self {
        Self {
            confidence: confidence(probs),
            effective_candidates: effective_candidates(probs),
            entropy_bits: entropy(probs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(ItemId, f64)]) -> WeightVector {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let cases = [
            weights(&[(1, 1.0), (2, 2.0), (3, 3.0)]),
            weights(&[(1, 1e-300), (2, 1e-300)]),
            weights(&[(1, 0.0), (2, 5.0)]),
            weights(&[(10, 1e12), (11, 3.5), (12, 0.1)]),
        ];
        for w in &cases {
            let probs = normalize(w).unwrap();
            assert!((probs.sum() - 1.0).abs() < 1e-12, "sum was {}", probs.sum());
        }
    }

    #[test]
    fn test_normalize_rejects_zero_mass() {
        assert!(matches!(
            normalize(&weights(&[(1, 0.0), (2, 0.0)])),
            Err(EngineError::DegenerateWeights(_))
        ));
        assert!(normalize(&WeightVector::new()).is_err());
    }

    #[test]
    fn test_confidence_is_max_probability() {
        let probs = normalize(&weights(&[(1, 1.0), (2, 6.0), (3, 3.0)])).unwrap();
        let c = confidence(&probs);
        assert!((0.0..=1.0).contains(&c));
        assert!((c - 0.6).abs() < 1e-12);
        assert_eq!(top_candidate(&probs).unwrap().id, 2);
    }

    #[test]
    fn test_ties_break_by_lowest_id() {
        let probs = normalize(&weights(&[(9, 2.0), (4, 2.0), (7, 1.0)])).unwrap();
        assert_eq!(top_candidate(&probs).unwrap().id, 4);

        let order: Vec<ItemId> = ranked(&probs, &BTreeSet::new(), 10).iter().map(|c| c.id).collect();
        assert_eq!(order, vec![4, 9, 7]);
    }

    #[test]
    fn test_top_eligible_skips_rejected() {
        let probs = normalize(&weights(&[(1, 0.1), (2, 0.2), (3, 100.0)])).unwrap();
        let rejected: BTreeSet<ItemId> = [3].into_iter().collect();
        assert_eq!(top_candidate(&probs).unwrap().id, 3);
        assert_eq!(top_eligible(&probs, &rejected).unwrap().id, 2);

        let all: BTreeSet<ItemId> = [1, 2, 3].into_iter().collect();
        assert!(top_eligible(&probs, &all).is_none());
    }

    #[test]
    fn test_effective_candidates_is_monotonic() {
        let uniform = normalize(&weights(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)])).unwrap();
        let skewed = normalize(&weights(&[(1, 5.0), (2, 1.0), (3, 1.0), (4, 1.0)])).unwrap();
        let point = normalize(&weights(&[(1, 1.0), (2, 0.0), (3, 0.0), (4, 0.0)])).unwrap();

        assert!((effective_candidates(&uniform) - 4.0).abs() < 1e-12);
        assert!(effective_candidates(&skewed) < effective_candidates(&uniform));
        assert!((effective_candidates(&point) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_entropy_bits() {
        assert!((entropy_of([1.0, 1.0]) - 1.0).abs() < 1e-12);
        assert!((entropy_of([1.0, 1.0, 1.0, 1.0]) - 2.0).abs() < 1e-12);
        assert_eq!(entropy_of([3.0, 0.0]), 0.0);
        assert_eq!(entropy_of(std::iter::empty()), 0.0);
    }
}
