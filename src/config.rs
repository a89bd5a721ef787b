//! Engine configuration
//!
//! Every tuning constant the engine uses lives here, so behaviour can be
//! recalibrated from a TOML file without touching the engine. Missing keys
//! fall back to the defaults below.

use crate::error::{EngineError, Result};
use crate::types::Answer;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Multipliers applied to items that have / lack the asked attribute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LikelihoodPair {
    pub has: f64,
    pub lacks: f64,
}

impl LikelihoodPair {
    pub const IDENTITY: LikelihoodPair = LikelihoodPair { has: 1.0, lacks: 1.0 };

    pub const fn new(has: f64, lacks: f64) -> Self {
        Self { has, lacks }
    }

    pub fn factor(&self, has_attribute: bool) -> f64 {
        if has_attribute {
            self.has
        } else {
            self.lacks
        }
    }
}

/// Likelihood table for the real weight update, one pair per informative
/// answer grade. `Unknown` is always the identity and cannot be configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnswerLikelihoods {
    pub yes: LikelihoodPair,
    pub probably_yes: LikelihoodPair,
    pub probably_no: LikelihoodPair,
    pub no: LikelihoodPair,
}

impl Default for AnswerLikelihoods {
    fn default() -> Self {
        Self {
            yes: LikelihoodPair::new(1.0, 0.1),
            probably_yes: LikelihoodPair::new(1.0, 0.5),
            probably_no: LikelihoodPair::new(0.5, 1.0),
            no: LikelihoodPair::new(0.1, 1.0),
        }
    }
}

impl AnswerLikelihoods {
    pub fn pair(&self, answer: Answer) -> LikelihoodPair {
        match answer {
            Answer::Yes => self.yes,
            Answer::ProbablyYes => self.probably_yes,
            Answer::Unknown => LikelihoodPair::IDENTITY,
            Answer::ProbablyNo => self.probably_no,
            Answer::No => self.no,
        }
    }
}

/// Inclusive coverage interval `[min, max]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoverageBand {
    pub min: f64,
    pub max: f64,
}

impl CoverageBand {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Exploration strategy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Tag whose coverage is closest to one half
    CoverageNearestHalf,
    /// Tag minimizing expected posterior entropy
    #[default]
    InformationGain,
}

/// When and how confirmation questions are inserted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfirmConfig {
    /// Question indices at which a confirmation is always attempted
    pub forced_indices: Vec<u32>,
    /// Confidence band that triggers a confirmation
    pub confidence_band: CoverageBand,
    /// Effective-candidate count at or below which a confirmation is inserted
    pub effective_candidates_threshold: f64,
    /// Above this confidence a hard confirmation is preferred
    pub hard_threshold: f64,
    /// Above this confidence a soft confirmation is preferred when available
    pub soft_threshold: f64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            forced_indices: Vec::new(),
            confidence_band: CoverageBand { min: 0.45, max: 0.8 },
            effective_candidates_threshold: 2.5,
            hard_threshold: 0.7,
            soft_threshold: 0.5,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Smoothing exponent applied to popularity
    pub alpha: f64,
    /// Added to popularity so nothing starts at zero weight
    pub epsilon: f64,
    /// Confidence at which the best non-rejected candidate is revealed
    pub reveal_threshold: f64,
    pub max_questions: u32,
    pub reveal_miss_limit: u32,
    /// Multiplier (< 1) applied to a rejected reveal
    pub penalty_factor: f64,
    /// Popularity added to an item after a successful reveal
    pub play_bonus: u64,
    pub fail_list_size: usize,
    /// Consecutive negative answers before switching to high-coverage questions
    pub no_streak_threshold: u32,
    pub strategy: SelectionStrategy,
    pub answer_likelihoods: AnswerLikelihoods,
    /// Idealized yes/no oracle used only to rank tags by information gain
    pub info_gain_likelihood: LikelihoodPair,
    pub coverage_band: Option<CoverageBand>,
    pub confirm: ConfirmConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            epsilon: 0.1,
            reveal_threshold: 0.85,
            max_questions: 25,
            reveal_miss_limit: 3,
            penalty_factor: 0.01,
            play_bonus: 1,
            fail_list_size: 5,
            no_streak_threshold: 4,
            strategy: SelectionStrategy::InformationGain,
            answer_likelihoods: AnswerLikelihoods::default(),
            info_gain_likelihood: LikelihoodPair::new(0.9, 0.1),
            coverage_band: None,
            confirm: ConfirmConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(EngineError::InvalidConfig(msg))
        }

        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return invalid(format!("alpha must be positive, got {}", self.alpha));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return invalid(format!("epsilon must be positive, got {}", self.epsilon));
        }
        if !(self.reveal_threshold > 0.0 && self.reveal_threshold <= 1.0) {
            return invalid(format!("reveal_threshold must be in (0, 1], got {}", self.reveal_threshold));
        }
        if !(self.penalty_factor >= 0.0 && self.penalty_factor < 1.0) {
            return invalid(format!("penalty_factor must be in [0, 1), got {}", self.penalty_factor));
        }
        if self.max_questions == 0 {
            return invalid("max_questions must be at least 1".to_string());
        }
        if self.reveal_miss_limit == 0 {
            return invalid("reveal_miss_limit must be at least 1".to_string());
        }

        for answer in Answer::ALL {
            let pair = self.answer_likelihoods.pair(answer);
            if !(pair.has.is_finite() && pair.lacks.is_finite() && pair.has > 0.0 && pair.lacks > 0.0) {
                return invalid(format!("likelihoods for '{}' must be positive", answer));
            }
        }

        let oracle = self.info_gain_likelihood;
        if !(oracle.has > 0.0 && oracle.has < 1.0 && oracle.lacks > 0.0 && oracle.lacks < 1.0) {
            return invalid("info_gain_likelihood values must lie strictly inside (0, 1)".to_string());
        }

        if let Some(band) = self.coverage_band {
            if band.min > band.max {
                return invalid(format!("coverage_band min {} exceeds max {}", band.min, band.max));
            }
        }
        let band = self.confirm.confidence_band;
        if band.min > band.max {
            return invalid(format!("confirm.confidence_band min {} exceeds max {}", band.min, band.max));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            alpha = 1.0
            strategy = "coverage_nearest_half"

            [answer_likelihoods.no]
            has = 0.05
            lacks = 1.0

            [confirm]
            forced_indices = [5, 10]
            "#,
        )
        .unwrap();

        assert_eq!(config.alpha, 1.0);
        assert_eq!(config.strategy, SelectionStrategy::CoverageNearestHalf);
        assert_eq!(config.answer_likelihoods.no.has, 0.05);
        assert_eq!(config.answer_likelihoods.yes, AnswerLikelihoods::default().yes);
        assert_eq!(config.confirm.forced_indices, vec![5, 10]);
        assert_eq!(config.confirm.hard_threshold, ConfirmConfig::default().hard_threshold);
        assert_eq!(config.max_questions, EngineConfig::default().max_questions);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::from_toml_str("penalty_factor = 1.5").is_err());
        assert!(EngineConfig::from_toml_str("epsilon = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("[answer_likelihoods.yes]\nhas = 1.0\nlacks = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("coverage_band = { min = 0.8, max = 0.2 }").is_err());
        assert!(EngineConfig::from_toml_str("alpha = \"high\"").is_err());
        assert!(EngineConfig::from_toml_str("[answer_likelihoods.unknown]\nhas = 2.0\nlacks = 1.0").is_err());
    }

    #[test]
    fn test_unknown_answer_is_always_identity() {
        let config = EngineConfig::from_toml_str("[answer_likelihoods.yes]\nhas = 2.0\nlacks = 0.5").unwrap();
        assert_eq!(config.answer_likelihoods.pair(Answer::Yes), LikelihoodPair::new(2.0, 0.5));
        assert_eq!(config.answer_likelihoods.pair(Answer::Unknown), LikelihoodPair::IDENTITY);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "reveal_threshold = 0.9\nmax_questions = 10\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.reveal_threshold, 0.9);
        assert_eq!(config.max_questions, 10);
    }
}
