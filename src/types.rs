//! Core types for the guessing engine
//!
//! Catalog entries are immutable for the lifetime of a session; everything
//! a session mutates lives in [`crate::session::Session`].

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog item identifier. Ascending id order is the universal tie-break.
pub type ItemId = u64;

/// Coarse classification used by the catalog gate
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Generated,
    Manual,
    #[default]
    Unknown,
}

/// The player's coarse preference over [`Classification::Generated`] items
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    /// Only generated items
    Include,
    /// Everything except generated items
    Exclude,
    #[default]
    Either,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Generated => "generated",
            Classification::Manual => "manual",
            Classification::Unknown => "unknown",
        }
    }

    /// Lenient parse; anything unrecognized is `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "generated" => Classification::Generated,
            "manual" => Classification::Manual,
            _ => Classification::Unknown,
        }
    }
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Include => "include",
            Gate::Exclude => "exclude",
            Gate::Either => "either",
        }
    }
}

impl FromStr for Gate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(Gate::Include),
            "exclude" => Ok(Gate::Exclude),
            "either" | "" => Ok(Gate::Either),
            other => Err(EngineError::InvalidConfig(format!("unknown gate '{}'", other))),
        }
    }
}

/// Membership of an item in a tag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagRef {
    pub key: String,
    /// Extraction confidence, when the tag source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl TagRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), weight: None }
    }
}

/// A catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub base_popularity: u64,
    /// Accumulated one-time bonuses from successful reveals
    #[serde(default)]
    pub play_bonus: u64,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

impl Item {
    pub fn popularity(&self) -> u64 {
        self.base_popularity.saturating_add(self.play_bonus)
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.iter().any(|t| t.key == key)
    }

    /// True if the item carries at least one of `keys`
    pub fn has_any_tag(&self, keys: &[String]) -> bool {
        keys.iter().any(|k| self.has_tag(k))
    }

    /// Normalized value of a hard-confirm field, if the item has one
    pub fn confirm_value(&self, kind: HardConfirmKind) -> Option<String> {
        match kind {
            HardConfirmKind::TitleInitial => title_initial(&self.title),
            HardConfirmKind::Author => self.author.as_deref().and_then(normalize_author),
        }
    }
}

/// First alphanumeric character of a title, uppercased
pub fn title_initial(title: &str) -> Option<String> {
    title
        .chars()
        .find(|c| c.is_alphanumeric())
        .map(|c| c.to_uppercase().collect())
}

/// Trimmed, case-folded, single-spaced author name
pub fn normalize_author(author: &str) -> Option<String> {
    let folded = author
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if folded.is_empty() {
        None
    } else {
        Some(folded)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TagType {
    #[default]
    Official,
    Derived,
    /// Reserved for soft confirmation, never used for exploration
    Structural,
}

impl TagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagType::Official => "official",
            TagType::Derived => "derived",
            TagType::Structural => "structural",
        }
    }

    /// Lenient parse; anything unrecognized is `Official`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "derived" => TagType::Derived,
            "structural" => TagType::Structural,
            _ => TagType::Official,
        }
    }
}

/// A single yes/no attribute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub tag_type: TagType,
    #[serde(default)]
    pub category: String,
}

/// Several tags asked as one question ("any of these?")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryTag {
    pub key: String,
    pub name: String,
    pub members: Vec<String>,
}

/// Graded answer on a five-point ordinal scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Yes,
    ProbablyYes,
    /// "Don't know" / "don't care": leaves weights untouched
    Unknown,
    ProbablyNo,
    No,
}

impl Answer {
    pub const ALL: [Answer; 5] = [
        Answer::Yes,
        Answer::ProbablyYes,
        Answer::Unknown,
        Answer::ProbablyNo,
        Answer::No,
    ];

    /// Decode the numeric grade used by clients: 2, 1, 0, -1, -2
    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            2 => Ok(Answer::Yes),
            1 => Ok(Answer::ProbablyYes),
            0 => Ok(Answer::Unknown),
            -1 => Ok(Answer::ProbablyNo),
            -2 => Ok(Answer::No),
            other => Err(EngineError::InvalidAnswerGrade(format!("code {}", other))),
        }
    }

    pub fn code(self) -> i8 {
        match self {
            Answer::Yes => 2,
            Answer::ProbablyYes => 1,
            Answer::Unknown => 0,
            Answer::ProbablyNo => -1,
            Answer::No => -2,
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Answer::No | Answer::ProbablyNo)
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Answer::Yes | Answer::ProbablyYes)
    }
}

impl FromStr for Answer {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(Answer::Yes),
            "py" | "probably" | "probably_yes" => Ok(Answer::ProbablyYes),
            "?" | "dk" | "unknown" | "dont_care" => Ok(Answer::Unknown),
            "pn" | "probably_not" | "probably_no" => Ok(Answer::ProbablyNo),
            "n" | "no" => Ok(Answer::No),
            other => Err(EngineError::InvalidAnswerGrade(other.to_string())),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Answer::Yes => "yes",
            Answer::ProbablyYes => "probably yes",
            Answer::Unknown => "don't know",
            Answer::ProbablyNo => "probably not",
            Answer::No => "no",
        };
        f.write_str(s)
    }
}

/// Structural checks asked as exact-match confirmations, in asking order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HardConfirmKind {
    TitleInitial,
    Author,
}

impl HardConfirmKind {
    pub const ORDER: [HardConfirmKind; 2] = [HardConfirmKind::TitleInitial, HardConfirmKind::Author];
}

/// Soft or hard, as chosen by the confirm-type policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmType {
    Soft,
    Hard,
}

/// A question posed to the player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionDescriptor {
    /// Attribute question; `summary_tag_keys` present for an OR-grouping
    ExploreTag {
        tag_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary_tag_keys: Option<Vec<String>>,
    },
    SoftConfirm { tag_key: String },
    HardConfirm { kind: HardConfirmKind, value: String },
}

impl QuestionDescriptor {
    pub fn explore(tag_key: impl Into<String>) -> Self {
        QuestionDescriptor::ExploreTag { tag_key: tag_key.into(), summary_tag_keys: None }
    }

    pub fn summary(summary: &SummaryTag) -> Self {
        QuestionDescriptor::ExploreTag {
            tag_key: summary.key.clone(),
            summary_tag_keys: Some(summary.members.clone()),
        }
    }

    pub fn is_confirm(&self) -> bool {
        !matches!(self, QuestionDescriptor::ExploreTag { .. })
    }

    /// Key this question "touches" for the purpose of never asking it twice
    pub fn tag_key(&self) -> Option<&str> {
        match self {
            QuestionDescriptor::ExploreTag { tag_key, .. }
            | QuestionDescriptor::SoftConfirm { tag_key } => Some(tag_key),
            QuestionDescriptor::HardConfirm { .. } => None,
        }
    }

    /// Reject descriptors no catalog item could ever be evaluated against
    pub fn validate(&self) -> Result<()> {
        match self {
            QuestionDescriptor::ExploreTag { tag_key, summary_tag_keys } => {
                if tag_key.trim().is_empty() {
                    return Err(EngineError::UnknownQuestionKind("explore question without tag".into()));
                }
                if let Some(members) = summary_tag_keys {
                    if members.is_empty() || members.iter().any(|m| m.trim().is_empty()) {
                        return Err(EngineError::UnknownQuestionKind(format!(
                            "summary '{}' has no usable member tags",
                            tag_key
                        )));
                    }
                }
                Ok(())
            }
            QuestionDescriptor::SoftConfirm { tag_key } => {
                if tag_key.trim().is_empty() {
                    return Err(EngineError::UnknownQuestionKind("soft confirm without tag".into()));
                }
                Ok(())
            }
            QuestionDescriptor::HardConfirm { kind, value } => {
                if value.trim().is_empty() {
                    return Err(EngineError::UnknownQuestionKind(format!(
                        "hard confirm {:?} without value",
                        kind
                    )));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for QuestionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionDescriptor::ExploreTag { tag_key, summary_tag_keys: None } => {
                write!(f, "Does it have '{}'?", tag_key)
            }
            QuestionDescriptor::ExploreTag { tag_key, summary_tag_keys: Some(members) } => {
                write!(f, "Is it anything like '{}' ({})?", tag_key, members.join(", "))
            }
            QuestionDescriptor::SoftConfirm { tag_key } => {
                write!(f, "Is '{}' really a defining trait?", tag_key)
            }
            QuestionDescriptor::HardConfirm { kind: HardConfirmKind::TitleInitial, value } => {
                write!(f, "Does the title start with '{}'?", value)
            }
            QuestionDescriptor::HardConfirm { kind: HardConfirmKind::Author, value } => {
                write!(f, "Is it by {}?", value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_codes() {
        for answer in Answer::ALL {
            assert_eq!(Answer::from_code(answer.code()).unwrap(), answer);
        }
        assert!(matches!(Answer::from_code(3), Err(EngineError::InvalidAnswerGrade(_))));
        assert!(matches!("maybe".parse::<Answer>(), Err(EngineError::InvalidAnswerGrade(_))));
        assert_eq!("PN".parse::<Answer>().unwrap(), Answer::ProbablyNo);
    }

    #[test]
    fn test_confirm_values_are_normalized() {
        let item = Item {
            id: 1,
            title: "  \"quiet\" Harbor".to_string(),
            author: Some("  Ana   MARIA ".to_string()),
            base_popularity: 0,
            play_bonus: 0,
            classification: Classification::Manual,
            tags: vec![],
        };
        assert_eq!(item.confirm_value(HardConfirmKind::TitleInitial), Some("Q".to_string()));
        assert_eq!(item.confirm_value(HardConfirmKind::Author), Some("ana maria".to_string()));
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(QuestionDescriptor::explore("cat").validate().is_ok());
        let empty_summary = QuestionDescriptor::ExploreTag {
            tag_key: "pets".into(),
            summary_tag_keys: Some(vec![]),
        };
        assert!(matches!(empty_summary.validate(), Err(EngineError::UnknownQuestionKind(_))));
        let blank_hard = QuestionDescriptor::HardConfirm {
            kind: HardConfirmKind::Author,
            value: "  ".into(),
        };
        assert!(blank_hard.validate().is_err());
    }

    #[test]
    fn test_descriptor_serde_is_tagged() {
        let q = QuestionDescriptor::HardConfirm {
            kind: HardConfirmKind::TitleInitial,
            value: "Q".into(),
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "hard_confirm");
        assert_eq!(json["kind"], "title_initial");
        let back: QuestionDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
    }
}
