//! The session aggregate: weights, append-only history and snapshots
//!
//! Every question or reveal gets the next `q_index`. The weight vector is
//! snapshotted under that index *before* the entry is answered, so rolling
//! back to `q` restores exactly the state in which entry `q` was first posed.
//! Counters and the rejected set are re-derived from the truncated history;
//! only `bonus_applied` survives a rollback.

use crate::error::{EngineError, Result};
use crate::scorer::RankedCandidate;
use crate::types::{Answer, Gate, HardConfirmKind, ItemId, QuestionDescriptor};
use crate::weights::WeightVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Where a session stands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Built but not yet advanced; never persisted
    Created,
    /// Awaiting an answer to an exploration question
    Quiz { q_index: u32, question: QuestionDescriptor },
    /// Awaiting an answer to a confirmation question
    Confirm { q_index: u32, question: QuestionDescriptor },
    /// Awaiting yes/no on a revealed item
    Reveal { q_index: u32, item_id: ItemId, forced: bool },
    Success { item_id: ItemId },
    /// Out of reveals or candidates; best remaining guesses
    FailList { candidates: Vec<RankedCandidate> },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success { .. } | SessionState::FailList { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Quiz { .. } => "quiz",
            SessionState::Confirm { .. } => "confirm",
            SessionState::Reveal { .. } => "reveal",
            SessionState::Success { .. } => "success",
            SessionState::FailList { .. } => "fail_list",
        }
    }
}

/// One addressable step of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum HistoryEntry {
    Question {
        question: QuestionDescriptor,
        answer: Option<Answer>,
    },
    Reveal {
        item_id: ItemId,
        forced: bool,
        accepted: Option<bool>,
    },
}

impl HistoryEntry {
    fn clear_answer(&mut self) {
        match self {
            HistoryEntry::Question { answer, .. } => *answer = None,
            HistoryEntry::Reveal { accepted, .. } => *accepted = None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub gate: Gate,
    /// Key for the confirm-type coin flips
    pub seed: u64,
    pub question_count: u32,
    pub reveal_misses: u32,
    pub rejected: BTreeSet<ItemId>,
    pub weights: WeightVector,
    pub snapshots: BTreeMap<u32, WeightVector>,
    pub history: BTreeMap<u32, HistoryEntry>,
    pub state: SessionState,
    pub bonus_applied: bool,
    /// Optimistic concurrency token, bumped on every stored update
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(gate: Gate, weights: WeightVector, seed: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            gate,
            seed,
            question_count: 0,
            reveal_misses: 0,
            rejected: BTreeSet::new(),
            weights,
            snapshots: BTreeMap::new(),
            history: BTreeMap::new(),
            state: SessionState::Created,
            bonus_applied: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Index the next entry will receive
    pub fn next_index(&self) -> u32 {
        self.history.keys().next_back().map_or(1, |last| last + 1)
    }

    fn append(&mut self, entry: HistoryEntry) -> u32 {
        let q_index = self.next_index();
        self.snapshots.insert(q_index, self.weights.clone());
        self.history.insert(q_index, entry);
        q_index
    }

    /// Record a new question and wait for its answer
    pub fn pose(&mut self, question: QuestionDescriptor) -> u32 {
        let confirm = question.is_confirm();
        let q_index = self.append(HistoryEntry::Question { question: question.clone(), answer: None });
        self.question_count += 1;
        self.state = if confirm {
            SessionState::Confirm { q_index, question }
        } else {
            SessionState::Quiz { q_index, question }
        };
        q_index
    }

    /// Record a reveal and wait for the verdict
    pub fn reveal(&mut self, item_id: ItemId, forced: bool) -> u32 {
        let q_index = self.append(HistoryEntry::Reveal { item_id, forced, accepted: None });
        self.state = SessionState::Reveal { q_index, item_id, forced };
        q_index
    }

    pub fn record_answer(&mut self, q_index: u32, given: Answer) {
        if let Some(HistoryEntry::Question { answer, .. }) = self.history.get_mut(&q_index) {
            *answer = Some(given);
        }
    }

    pub fn record_verdict(&mut self, q_index: u32, verdict: bool) {
        if let Some(HistoryEntry::Reveal { accepted, .. }) = self.history.get_mut(&q_index) {
            *accepted = Some(verdict);
        }
    }

    pub fn questions(&self) -> impl Iterator<Item = (u32, &QuestionDescriptor, Option<Answer>)> + '_ {
        self.history.iter().filter_map(|(idx, entry)| match entry {
            HistoryEntry::Question { question, answer } => Some((*idx, question, *answer)),
            HistoryEntry::Reveal { .. } => None,
        })
    }

    /// Tag and summary keys already asked, by exploration or soft confirmation
    pub fn touched_tags(&self) -> BTreeSet<String> {
        self.questions()
            .filter_map(|(_, q, _)| q.tag_key().map(str::to_string))
            .collect()
    }

    pub fn used_hard_confirms(&self) -> BTreeSet<HardConfirmKind> {
        self.questions()
            .filter_map(|(_, q, _)| match q {
                QuestionDescriptor::HardConfirm { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    /// Length of the trailing run of negative answers
    pub fn no_streak(&self) -> u32 {
        let mut streak = 0;
        for (_, _, answer) in self.questions() {
            match answer {
                Some(a) if a.is_negative() => streak += 1,
                Some(_) => streak = 0,
                None => {}
            }
        }
        streak
    }

    pub fn forced_reveals(&self) -> usize {
        self.history
            .values()
            .filter(|e| matches!(e, HistoryEntry::Reveal { forced: true, .. }))
            .count()
    }

    /// Restore the state in which entry `target` (or the closest earlier
    /// snapshotted entry) was posed. Returns the index actually used.
    pub fn rollback_to(&mut self, target: u32) -> Result<u32> {
        let q_index = self
            .snapshots
            .range(..=target)
            .rev()
            .map(|(idx, _)| *idx)
            .find(|idx| self.history.contains_key(idx))
            .ok_or(EngineError::RollbackTargetUnavailable(target))?;

        let weights = self
            .snapshots
            .get(&q_index)
            .cloned()
            .ok_or(EngineError::RollbackTargetUnavailable(target))?;

        self.snapshots.split_off(&(q_index + 1));
        self.history.split_off(&(q_index + 1));
        if let Some(entry) = self.history.get_mut(&q_index) {
            entry.clear_answer();
        }
        self.weights = weights;
        self.rebuild_from_history();
        Ok(q_index)
    }

    /// Re-derive counters, the rejected set and the pending state from history
    fn rebuild_from_history(&mut self) {
        self.question_count = 0;
        self.reveal_misses = 0;
        self.rejected.clear();

        for entry in self.history.values() {
            match entry {
                HistoryEntry::Question { .. } => self.question_count += 1,
                HistoryEntry::Reveal { item_id, accepted: Some(false), .. } => {
                    self.reveal_misses += 1;
                    self.rejected.insert(*item_id);
                }
                HistoryEntry::Reveal { .. } => {}
            }
        }

        self.state = match self.history.iter().next_back() {
            Some((q_index, HistoryEntry::Question { question, .. })) if question.is_confirm() => {
                SessionState::Confirm { q_index: *q_index, question: question.clone() }
            }
            Some((q_index, HistoryEntry::Question { question, .. })) => {
                SessionState::Quiz { q_index: *q_index, question: question.clone() }
            }
            Some((q_index, HistoryEntry::Reveal { item_id, forced, .. })) => {
                SessionState::Reveal { q_index: *q_index, item_id: *item_id, forced: *forced }
            }
            None => SessionState::Created,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let weights: WeightVector = [(1, 1.0), (2, 2.0), (3, 3.0)].into_iter().collect();
        Session::new(Gate::Either, weights, 42)
    }

    #[test]
    fn test_pose_snapshots_before_answer() {
        let mut s = session();
        let before = s.weights.clone();
        let q = s.pose(QuestionDescriptor::explore("red"));
        assert_eq!(q, 1);
        assert_eq!(s.snapshots.get(&1), Some(&before));
        assert_eq!(s.question_count, 1);
        assert!(matches!(s.state, SessionState::Quiz { q_index: 1, .. }));

        s.record_answer(1, Answer::No);
        s.weights.scale(1, 0.5);
        assert_eq!(s.snapshots.get(&1), Some(&before));
        assert_eq!(s.next_index(), 2);
    }

    #[test]
    fn test_confirm_questions_enter_confirm_state() {
        let mut s = session();
        s.pose(QuestionDescriptor::SoftConfirm { tag_key: "red".into() });
        assert!(matches!(s.state, SessionState::Confirm { .. }));
    }

    #[test]
    fn test_no_streak_counts_trailing_negatives() {
        let mut s = session();
        for (i, answer) in [Answer::Yes, Answer::No, Answer::ProbablyNo, Answer::No].into_iter().enumerate() {
            let q = s.pose(QuestionDescriptor::explore(format!("t{}", i)));
            s.record_answer(q, answer);
        }
        assert_eq!(s.no_streak(), 3);

        let q = s.pose(QuestionDescriptor::explore("t9"));
        s.record_answer(q, Answer::ProbablyYes);
        assert_eq!(s.no_streak(), 0);
    }

    #[test]
    fn test_rollback_rebuilds_counters_and_state() {
        let mut s = session();
        let q1 = s.pose(QuestionDescriptor::explore("red"));
        s.record_answer(q1, Answer::Yes);
        s.weights.scale(2, 0.1);

        let r = s.reveal(3, false);
        s.record_verdict(r, false);
        s.weights.scale(3, 0.01);
        s.rejected.insert(3);
        s.reveal_misses = 1;

        let q3 = s.pose(QuestionDescriptor::HardConfirm { kind: HardConfirmKind::TitleInitial, value: "I".into() });
        s.record_answer(q3, Answer::No);
        let after_reveal = s.snapshots.get(&q3).cloned().unwrap();

        assert_eq!(s.rollback_to(q3).unwrap(), q3);
        assert_eq!(s.weights, after_reveal);
        assert_eq!(s.rejected, [3].into_iter().collect());
        assert_eq!(s.reveal_misses, 1);
        assert_eq!(s.question_count, 2);
        assert!(matches!(s.state, SessionState::Confirm { q_index: 3, .. }));
        assert_eq!(s.used_hard_confirms().len(), 1);

        assert_eq!(s.rollback_to(r).unwrap(), r);
        assert!(s.rejected.is_empty());
        assert_eq!(s.reveal_misses, 0);
        assert!(matches!(s.state, SessionState::Reveal { item_id: 3, .. }));
        assert!(s.used_hard_confirms().is_empty());
        assert_eq!(s.history.len(), 2);
    }

    #[test]
    fn test_rollback_snaps_to_closest_earlier_index() {
        let mut s = session();
        let q1 = s.pose(QuestionDescriptor::explore("a"));
        s.record_answer(q1, Answer::Yes);
        let q2 = s.pose(QuestionDescriptor::explore("b"));
        s.record_answer(q2, Answer::Yes);
        let q3 = s.pose(QuestionDescriptor::explore("c"));
        s.record_answer(q3, Answer::Yes);

        // open a gap at 2
        s.snapshots.remove(&2);
        assert_eq!(s.rollback_to(2).unwrap(), 1);
        assert_eq!(s.history.len(), 1);

        assert!(matches!(s.rollback_to(0), Err(EngineError::RollbackTargetUnavailable(0))));
    }

    #[test]
    fn test_rollback_keeps_bonus_flag() {
        let mut s = session();
        let r = s.reveal(3, false);
        s.record_verdict(r, true);
        s.bonus_applied = true;
        s.state = SessionState::Success { item_id: 3 };

        s.rollback_to(r).unwrap();
        assert!(s.bonus_applied);
        assert!(matches!(s.state, SessionState::Reveal { .. }));
    }

    #[test]
    fn test_session_json_is_lossless() {
        let mut s = session();
        s.weights.scale(1, 0.1);
        s.weights.scale(2, 1.0 / 3.0);
        s.pose(QuestionDescriptor::explore("red"));

        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.weights.fingerprint(), s.weights.fingerprint());
        assert_eq!(back, s);
    }
}
