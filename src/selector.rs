//! Question selection
//!
//! Exploration questions come from one of two strategies:
//! - coverage nearest one half (or highest coverage after a run of "no")
//! - minimum expected posterior entropy under an idealized yes/no oracle
//!
//! Confirmation questions are inserted when the field has narrowed, and are
//! either soft (a distinctive tag of the current favourite) or hard (an exact
//! structural match such as the title initial).

use crate::catalog::CatalogView;
use crate::config::{ConfirmConfig, CoverageBand, EngineConfig, LikelihoodPair, SelectionStrategy};
use crate::scorer::{self, Metrics, ProbabilityVector};
use crate::types::{ConfirmType, HardConfirmKind, ItemId, QuestionDescriptor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Coverage this close to 0 or 1 carries no information
const DEGENERATE_COVERAGE: f64 = 1e-12;

/// Source of the 50/50 confirm-type split.
///
/// Draws are keyed by `(session seed, question index)` so that replaying or
/// rolling back a session redraws exactly the same values.
pub trait RandomSource {
    fn coin_flip(&self, seed: u64, q_index: u32) -> bool;
}

/// Production source: a fresh `StdRng` per draw, seeded from the key
#[derive(Debug, Clone, Copy, Default)]
pub struct SeededRandom;

impl RandomSource for SeededRandom {
    fn coin_flip(&self, seed: u64, q_index: u32) -> bool {
        let mixed = seed ^ (q_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(mixed).gen_bool(0.5)
    }
}

/// Test double that always lands on the same side
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub bool);

impl RandomSource for FixedRandom {
    fn coin_flip(&self, _seed: u64, _q_index: u32) -> bool {
        self.0
    }
}

/// An askable attribute: a single tag or an OR-group of tags
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub members: Option<Vec<String>>,
}

impl Attribute {
    fn carried_by(&self, view: &CatalogView, id: ItemId) -> bool {
        match &self.members {
            Some(members) => view.has_any_tag(id, members),
            None => view.has_tag(id, &self.key),
        }
    }

    pub fn question(&self) -> QuestionDescriptor {
        QuestionDescriptor::ExploreTag {
            tag_key: self.key.clone(),
            summary_tag_keys: self.members.clone(),
        }
    }
}

/// Attributes not yet asked, ascending by key
pub fn untouched_attributes(view: &CatalogView, touched: &BTreeSet<String>) -> Vec<Attribute> {
    let mut attributes: Vec<Attribute> = view
        .explore_tags()
        .iter()
        .filter(|key| !touched.contains(*key))
        .map(|key| Attribute { key: key.clone(), members: None })
        .chain(
            view.summaries()
                .iter()
                .filter(|s| !touched.contains(&s.key))
                .map(|s| Attribute { key: s.key.clone(), members: Some(s.members.clone()) }),
        )
        .collect();
    attributes.sort_by(|a, b| a.key.cmp(&b.key));
    attributes.dedup_by(|a, b| a.key == b.key);
    attributes
}

/// Total probability of the items carrying `attribute`
pub fn coverage(view: &CatalogView, probs: &ProbabilityVector, attribute: &Attribute) -> f64 {
    probs
        .iter()
        .filter(|(id, _)| attribute.carried_by(view, *id))
        .map(|(_, p)| p)
        .sum()
}

fn informative(coverage: f64) -> bool {
    coverage > DEGENERATE_COVERAGE && coverage < 1.0 - DEGENERATE_COVERAGE
}

/// Coverage-nearest-half selection; `prefer_high` maximizes coverage instead
pub fn select_by_coverage(
    view: &CatalogView,
    probs: &ProbabilityVector,
    touched: &BTreeSet<String>,
    prefer_high: bool,
) -> Option<QuestionDescriptor> {
    let mut best: Option<(f64, Attribute)> = None;

    for attribute in untouched_attributes(view, touched) {
        let cov = coverage(view, probs, &attribute);
        if !informative(cov) {
            continue;
        }
        // lower score wins; keys arrive ascending so strict < keeps the first
        let score = if prefer_high { -cov } else { (cov - 0.5).abs() };
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, attribute));
        }
    }

    best.map(|(_, attribute)| attribute.question())
}

/// Expected entropy (bits) after asking `attribute` of an idealized oracle
pub fn expected_entropy(
    view: &CatalogView,
    probs: &ProbabilityVector,
    attribute: &Attribute,
    oracle: LikelihoodPair,
) -> f64 {
    let mut yes_mass = Vec::with_capacity(probs.len());
    let mut no_mass = Vec::with_capacity(probs.len());

    for (id, p) in probs.iter() {
        let likelihood = oracle.factor(attribute.carried_by(view, id));
        yes_mass.push(p * likelihood);
        no_mass.push(p * (1.0 - likelihood));
    }

    let p_yes: f64 = yes_mass.iter().sum();
    let p_no: f64 = no_mass.iter().sum();
    p_yes * scorer::entropy_of(yes_mass) + p_no * scorer::entropy_of(no_mass)
}

/// Information-gain selection, optionally restricted to a coverage band
pub fn select_by_information_gain(
    view: &CatalogView,
    probs: &ProbabilityVector,
    touched: &BTreeSet<String>,
    oracle: LikelihoodPair,
    band: Option<CoverageBand>,
) -> Option<QuestionDescriptor> {
    let mut best: Option<(f64, Attribute)> = None;

    for attribute in untouched_attributes(view, touched) {
        let cov = coverage(view, probs, &attribute);
        if !informative(cov) || band.map_or(false, |b| !b.contains(cov)) {
            continue;
        }
        let score = expected_entropy(view, probs, &attribute, oracle);
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, attribute));
        }
    }

    best.map(|(_, attribute)| attribute.question())
}

/// Next exploration question under the configured strategy.
///
/// After `no_streak_threshold` consecutive negative answers both strategies
/// hand over to prefer-high-coverage, so the player hits a "yes" sooner.
pub fn select_explore(
    config: &EngineConfig,
    view: &CatalogView,
    probs: &ProbabilityVector,
    touched: &BTreeSet<String>,
    no_streak: u32,
) -> Option<QuestionDescriptor> {
    if config.no_streak_threshold > 0 && no_streak >= config.no_streak_threshold {
        return select_by_coverage(view, probs, touched, true);
    }
    match config.strategy {
        SelectionStrategy::CoverageNearestHalf => select_by_coverage(view, probs, touched, false),
        SelectionStrategy::InformationGain => {
            select_by_information_gain(view, probs, touched, config.info_gain_likelihood, config.coverage_band)
        }
    }
}

/// Whether the question at `q_index` should be a confirmation
pub fn should_insert_confirm(confirm: &ConfirmConfig, q_index: u32, metrics: &Metrics) -> bool {
    confirm.forced_indices.contains(&q_index)
        || confirm.confidence_band.contains(metrics.confidence)
        || metrics.effective_candidates <= confirm.effective_candidates_threshold
}

/// Soft or hard; `coin` is only consulted for the 50/50 fallback
pub fn select_confirm_type(
    confirm: &ConfirmConfig,
    confidence: f64,
    has_soft: bool,
    coin: impl FnOnce() -> bool,
) -> ConfirmType {
    if confidence > confirm.hard_threshold {
        ConfirmType::Hard
    } else if has_soft && confidence > confirm.soft_threshold {
        ConfirmType::Soft
    } else if has_soft {
        if coin() {
            ConfirmType::Soft
        } else {
            ConfirmType::Hard
        }
    } else {
        ConfirmType::Hard
    }
}

/// First hard-confirm kind not yet used, in the fixed order
pub fn next_hard_confirm_type(used: &BTreeSet<HardConfirmKind>) -> Option<HardConfirmKind> {
    HardConfirmKind::ORDER.into_iter().find(|kind| !used.contains(kind))
}

/// Hard confirmation for `top`: the first unused kind whose field the item has
pub fn hard_confirm_question(
    view: &CatalogView,
    top: ItemId,
    used: &BTreeSet<HardConfirmKind>,
) -> Option<QuestionDescriptor> {
    let item = view.item(top)?;
    let mut used = used.clone();
    while let Some(kind) = next_hard_confirm_type(&used) {
        if let Some(value) = item.confirm_value(kind) {
            return Some(QuestionDescriptor::HardConfirm { kind, value });
        }
        used.insert(kind);
    }
    None
}

/// Most distinctive unasked tag of `top` (lowest coverage, then key)
pub fn soft_confirm_tag(
    view: &CatalogView,
    probs: &ProbabilityVector,
    top: ItemId,
    touched: &BTreeSet<String>,
) -> Option<String> {
    let item = view.item(top)?;
    let mut keys: Vec<&str> = item
        .tags
        .iter()
        .map(|t| t.key.as_str())
        .filter(|k| !touched.contains(*k))
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut best: Option<(f64, &str)> = None;
    for key in keys {
        let cov = coverage(view, probs, &Attribute { key: key.to_string(), members: None });
        if cov >= 1.0 - DEGENERATE_COVERAGE {
            continue;
        }
        if best.map_or(true, |(c, _)| cov < c) {
            best = Some((cov, key));
        }
    }
    best.map(|(_, key)| key.to_string())
}

/// Everything a confirmation decision needs about the session
pub struct ConfirmContext<'a> {
    pub top: ItemId,
    pub confidence: f64,
    pub touched: &'a BTreeSet<String>,
    pub used_hard: &'a BTreeSet<HardConfirmKind>,
}

/// Confirmation question about the current favourite, if any is left.
/// Falls back to the other confirm type when the preferred one is exhausted.
pub fn select_confirm(
    confirm: &ConfirmConfig,
    view: &CatalogView,
    probs: &ProbabilityVector,
    ctx: &ConfirmContext<'_>,
    coin: impl FnOnce() -> bool,
) -> Option<QuestionDescriptor> {
    let soft = soft_confirm_tag(view, probs, ctx.top, ctx.touched)
        .map(|tag_key| QuestionDescriptor::SoftConfirm { tag_key });
    let hard = hard_confirm_question(view, ctx.top, ctx.used_hard);

    match select_confirm_type(confirm, ctx.confidence, soft.is_some(), coin) {
        ConfirmType::Hard => hard.or(soft),
        ConfirmType::Soft => soft.or(hard),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{item, tag};
    use crate::scorer::normalize;
    use crate::types::SummaryTag;
    use crate::weights::WeightVector;

    /// 4 items; "a" covers half the mass evenly, "b" covers a single item
    fn fixture() -> (CatalogView, ProbabilityVector) {
        let view = CatalogView::new(
            vec![
                item(1, 0, &["a", "b"]),
                item(2, 0, &["a"]),
                item(3, 0, &[]),
                item(4, 0, &[]),
            ],
            vec![tag("a"), tag("b")],
            vec![],
        );
        let weights: WeightVector = [(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)].into_iter().collect();
        (view, normalize(&weights).unwrap())
    }

    fn brute_force_expected_entropy(probs: &[f64], carries: &[bool], h: f64, l: f64) -> f64 {
        let entropy = |masses: &[f64]| {
            let total: f64 = masses.iter().sum();
            masses
                .iter()
                .filter(|m| **m > 0.0)
                .map(|m| {
                    let p = m / total;
                    -p * p.log2()
                })
                .sum::<f64>()
        };
        let yes: Vec<f64> = probs.iter().zip(carries).map(|(p, c)| p * if *c { h } else { l }).collect();
        let no: Vec<f64> = probs.iter().zip(carries).map(|(p, c)| p * if *c { 1.0 - h } else { 1.0 - l }).collect();
        let p_yes: f64 = yes.iter().sum();
        let p_no: f64 = no.iter().sum();
        p_yes * entropy(&yes) + p_no * entropy(&no)
    }

    #[test]
    fn test_information_gain_agrees_with_brute_force() {
        let (view, probs) = fixture();
        let oracle = LikelihoodPair::new(0.9, 0.1);
        let p = [0.25, 0.25, 0.25, 0.25];

        let a = Attribute { key: "a".into(), members: None };
        let b = Attribute { key: "b".into(), members: None };
        let brute_a = brute_force_expected_entropy(&p, &[true, true, false, false], 0.9, 0.1);
        let brute_b = brute_force_expected_entropy(&p, &[true, false, false, false], 0.9, 0.1);

        assert!((expected_entropy(&view, &probs, &a, oracle) - brute_a).abs() < 1e-12);
        assert!((expected_entropy(&view, &probs, &b, oracle) - brute_b).abs() < 1e-12);
        assert!(brute_a < brute_b);

        let chosen = select_by_information_gain(&view, &probs, &BTreeSet::new(), oracle, None);
        assert_eq!(chosen, Some(QuestionDescriptor::explore("a")));
    }

    #[test]
    fn test_coverage_band_can_exhaust_selection() {
        let (view, probs) = fixture();
        let oracle = LikelihoodPair::new(0.9, 0.1);

        let band = CoverageBand { min: 0.2, max: 0.3 };
        let chosen = select_by_information_gain(&view, &probs, &BTreeSet::new(), oracle, Some(band));
        assert_eq!(chosen, Some(QuestionDescriptor::explore("b")));

        let band = CoverageBand { min: 0.6, max: 0.9 };
        assert!(select_by_information_gain(&view, &probs, &BTreeSet::new(), oracle, Some(band)).is_none());
    }

    #[test]
    fn test_coverage_nearest_half_and_prefer_high() {
        let view = CatalogView::new(
            vec![
                item(1, 0, &["wide", "half"]),
                item(2, 0, &["wide", "half"]),
                item(3, 0, &["wide"]),
                item(4, 0, &["narrow"]),
            ],
            vec![tag("wide"), tag("half"), tag("narrow")],
            vec![],
        );
        let weights: WeightVector = [(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)].into_iter().collect();
        let probs = normalize(&weights).unwrap();

        assert_eq!(
            select_by_coverage(&view, &probs, &BTreeSet::new(), false),
            Some(QuestionDescriptor::explore("half"))
        );
        assert_eq!(
            select_by_coverage(&view, &probs, &BTreeSet::new(), true),
            Some(QuestionDescriptor::explore("wide"))
        );
    }

    #[test]
    fn test_coverage_ties_break_by_key() {
        let view = CatalogView::new(
            vec![item(1, 0, &["zeta"]), item(2, 0, &["alpha"])],
            vec![tag("zeta"), tag("alpha")],
            vec![],
        );
        let weights: WeightVector = [(1, 1.0), (2, 1.0)].into_iter().collect();
        let probs = normalize(&weights).unwrap();
        assert_eq!(
            select_by_coverage(&view, &probs, &BTreeSet::new(), false),
            Some(QuestionDescriptor::explore("alpha"))
        );
    }

    #[test]
    fn test_touched_and_uninformative_tags_are_skipped() {
        let (view, probs) = fixture();
        let touched: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        assert!(select_by_coverage(&view, &probs, &touched, false).is_none());

        let everywhere = CatalogView::new(
            vec![item(1, 0, &["all"]), item(2, 0, &["all"])],
            vec![tag("all"), tag("none")],
            vec![],
        );
        let weights: WeightVector = [(1, 1.0), (2, 1.0)].into_iter().collect();
        let probs = normalize(&weights).unwrap();
        assert!(select_by_coverage(&everywhere, &probs, &BTreeSet::new(), false).is_none());
    }

    #[test]
    fn test_summaries_are_candidates() {
        let view = CatalogView::new(
            vec![item(1, 0, &["cat"]), item(2, 0, &["dog"]), item(3, 0, &[]), item(4, 0, &[])],
            vec![tag("cat"), tag("dog")],
            vec![SummaryTag {
                key: "pets".into(),
                name: "Pets".into(),
                members: vec!["cat".into(), "dog".into()],
            }],
        );
        let weights: WeightVector = [(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)].into_iter().collect();
        let probs = normalize(&weights).unwrap();

        let chosen = select_by_coverage(&view, &probs, &BTreeSet::new(), false).unwrap();
        assert_eq!(
            chosen,
            QuestionDescriptor::ExploreTag {
                tag_key: "pets".into(),
                summary_tag_keys: Some(vec!["cat".into(), "dog".into()]),
            }
        );
    }

    #[test]
    fn test_no_streak_switches_to_high_coverage() {
        let (view, probs) = fixture();
        let config = EngineConfig { strategy: SelectionStrategy::CoverageNearestHalf, no_streak_threshold: 2, ..Default::default() };

        // "a" is exactly one half; "b" is the only other informative tag
        assert_eq!(select_explore(&config, &view, &probs, &BTreeSet::new(), 0), Some(QuestionDescriptor::explore("a")));
        assert_eq!(select_explore(&config, &view, &probs, &BTreeSet::new(), 2), Some(QuestionDescriptor::explore("a")));

        let touched: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(select_explore(&config, &view, &probs, &touched, 2), Some(QuestionDescriptor::explore("b")));
    }

    #[test]
    fn test_should_insert_confirm_triggers() {
        let confirm = ConfirmConfig {
            forced_indices: vec![3],
            confidence_band: CoverageBand { min: 0.5, max: 0.7 },
            effective_candidates_threshold: 2.0,
            ..Default::default()
        };
        let calm = Metrics { confidence: 0.2, effective_candidates: 8.0, entropy_bits: 3.0 };
        assert!(!should_insert_confirm(&confirm, 1, &calm));
        assert!(should_insert_confirm(&confirm, 3, &calm));

        let banded = Metrics { confidence: 0.6, ..calm };
        assert!(should_insert_confirm(&confirm, 1, &banded));

        let narrow = Metrics { effective_candidates: 2.0, ..calm };
        assert!(should_insert_confirm(&confirm, 1, &narrow));
    }

    #[test]
    fn test_select_confirm_type_policy() {
        let confirm = ConfirmConfig { hard_threshold: 0.7, soft_threshold: 0.5, ..Default::default() };
        let never = || -> bool { panic!("coin must not be consulted") };

        assert_eq!(select_confirm_type(&confirm, 0.9, true, never), ConfirmType::Hard);
        assert_eq!(select_confirm_type(&confirm, 0.6, true, never), ConfirmType::Soft);
        assert_eq!(select_confirm_type(&confirm, 0.3, false, never), ConfirmType::Hard);
        assert_eq!(select_confirm_type(&confirm, 0.3, true, || true), ConfirmType::Soft);
        assert_eq!(select_confirm_type(&confirm, 0.3, true, || false), ConfirmType::Hard);
    }

    #[test]
    fn test_hard_confirm_sequence_is_exhaustible() {
        let mut used = BTreeSet::new();
        assert_eq!(next_hard_confirm_type(&used), Some(HardConfirmKind::TitleInitial));
        used.insert(HardConfirmKind::TitleInitial);
        assert_eq!(next_hard_confirm_type(&used), Some(HardConfirmKind::Author));
        used.insert(HardConfirmKind::Author);
        assert_eq!(next_hard_confirm_type(&used), None);
    }

    #[test]
    fn test_hard_confirm_skips_missing_fields() {
        let mut anonymous = item(1, 0, &[]);
        anonymous.author = None;
        let view = CatalogView::new(vec![anonymous], vec![], vec![]);

        let used: BTreeSet<HardConfirmKind> = [HardConfirmKind::TitleInitial].into_iter().collect();
        assert_eq!(hard_confirm_question(&view, 1, &used), None);
        assert_eq!(
            hard_confirm_question(&view, 1, &BTreeSet::new()),
            Some(QuestionDescriptor::HardConfirm { kind: HardConfirmKind::TitleInitial, value: "I".into() })
        );
    }

    #[test]
    fn test_soft_confirm_picks_most_distinctive_tag() {
        let (view, probs) = fixture();
        assert_eq!(soft_confirm_tag(&view, &probs, 1, &BTreeSet::new()), Some("b".to_string()));

        let touched: BTreeSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(soft_confirm_tag(&view, &probs, 1, &touched), Some("a".to_string()));
        assert_eq!(soft_confirm_tag(&view, &probs, 3, &BTreeSet::new()), None);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let source = SeededRandom;
        let first: Vec<bool> = (0..32).map(|q| source.coin_flip(7, q)).collect();
        let second: Vec<bool> = (0..32).map(|q| source.coin_flip(7, q)).collect();
        assert_eq!(first, second);
        assert!(first.iter().any(|b| *b) && first.iter().any(|b| !*b));
    }
}
