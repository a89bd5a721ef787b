//! Session state machine
//!
//! ```text
//! Quiz ──answer──► Quiz | Confirm
//!   │                  │
//!   └──confident / out of questions──► Reveal ──yes──► Success
//!                                        │
//!                                        └──no──► Quiz | Reveal | FailList
//! ```
//!
//! The engine keeps no state between calls. Each operation reads the session
//! aggregate, advances it, and writes it back through the repository.

use crate::answer;
use crate::catalog::{CatalogProvider, CatalogView};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::repository::SessionRepository;
use crate::scorer::{self, Metrics, RankedCandidate};
use crate::selector::{self, ConfirmContext, RandomSource, SeededRandom};
use crate::session::{Session, SessionState};
use crate::types::{Answer, Gate, ItemId};
use crate::weights;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What the caller should show next
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub session_id: String,
    pub state: SessionState,
    pub question_count: u32,
    pub reveal_misses: u32,
    /// Absent only when the weights are degenerate
    pub metrics: Option<Metrics>,
    pub leaders: Vec<RankedCandidate>,
}

/// Outcome of a rollback request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rollback {
    pub requested: u32,
    pub rolled_back_to: u32,
    pub turn: Turn,
}

/// Number of leading candidates reported with each turn
const LEADERS: usize = 3;

pub struct SessionEngine<'a, C: ?Sized, R: ?Sized, G = SeededRandom> {
    catalog: &'a C,
    sessions: &'a R,
    config: &'a EngineConfig,
    random: G,
}

impl<'a, C, R> SessionEngine<'a, C, R, SeededRandom>
where
    C: CatalogProvider + ?Sized,
    R: SessionRepository + ?Sized,
{
    pub fn new(catalog: &'a C, sessions: &'a R, config: &'a EngineConfig) -> Self {
        Self::with_random(catalog, sessions, config, SeededRandom)
    }
}

impl<'a, C, R, G> SessionEngine<'a, C, R, G>
where
    C: CatalogProvider + ?Sized,
    R: SessionRepository + ?Sized,
    G: RandomSource,
{
    pub fn with_random(catalog: &'a C, sessions: &'a R, config: &'a EngineConfig, random: G) -> Self {
        Self { catalog, sessions, config, random }
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Start a session with a random coin-flip seed
    pub fn start(&self, gate: Gate) -> Result<Turn> {
        self.start_with_seed(gate, rand::random())
    }

    /// Start a session; identical seeds and answers replay identically
    pub fn start_with_seed(&self, gate: Gate, seed: u64) -> Result<Turn> {
        let view = CatalogView::load(self.catalog, gate)?;
        let candidates: Vec<_> = view.items().cloned().collect();
        let weights = weights::initialize(&candidates, self.config.epsilon, self.config.alpha)?;

        let mut session = Session::new(gate, weights, seed);
        info!(
            "Session {} started: {} candidates, gate {}",
            session.id,
            candidates.len(),
            gate.as_str()
        );

        self.advance(&view, &mut session)?;
        self.sessions.create(&session)?;
        self.turn_of(&session)
    }

    /// Current turn of a stored session
    pub fn current(&self, session_id: &str) -> Result<Turn> {
        let session = self.sessions.get(session_id)?;
        self.turn_of(&session)
    }

    /// Answer the pending question or reveal
    pub fn answer(&self, session_id: &str, answer: Answer) -> Result<Turn> {
        let mut session = self.sessions.get(session_id)?;
        let view = CatalogView::load(self.catalog, session.gate)?;

        let bonus_item = self.step(&view, &mut session, answer)?;
        self.sessions.update(&mut session)?;

        // the session is stored first: a failed write here loses a bonus
        // rather than applying it twice
        if let Some(item_id) = bonus_item {
            self.catalog.add_play_bonus(item_id, self.config.play_bonus)?;
            info!("Play bonus {} applied to item {}", self.config.play_bonus, item_id);
        }

        self.turn_of(&session)
    }

    /// Restore the session as it was when question `q_index` was posed
    pub fn rollback_to_question(&self, session_id: &str, q_index: u32) -> Result<Rollback> {
        let mut session = self.sessions.get(session_id)?;
        let rolled_back_to = session.rollback_to(q_index)?;
        self.sessions.update(&mut session)?;

        info!(
            "Session {} rolled back to question {} (requested {}), weights {}",
            session.id,
            rolled_back_to,
            q_index,
            session.weights.fingerprint()
        );

        Ok(Rollback {
            requested: q_index,
            rolled_back_to,
            turn: self.turn_of(&session)?,
        })
    }

    /// Apply one answer in memory. Returns the item owed a play bonus, if any.
    pub fn step(&self, view: &CatalogView, session: &mut Session, given: Answer) -> Result<Option<ItemId>> {
        match session.state.clone() {
            SessionState::Quiz { q_index, question } | SessionState::Confirm { q_index, question } => {
                let updated = answer::apply_answer(
                    &session.weights,
                    view,
                    &question,
                    given,
                    &self.config.answer_likelihoods,
                )?;
                session.record_answer(q_index, given);
                session.weights = updated;
                debug!(
                    "Session {} q{} answered '{}', weights {}",
                    session.id,
                    q_index,
                    given,
                    session.weights.fingerprint()
                );
                self.advance(view, session)?;
                Ok(None)
            }
            SessionState::Reveal { q_index, item_id, forced } => {
                let accepted = if given.is_positive() {
                    true
                } else if given.is_negative() {
                    false
                } else {
                    return Err(EngineError::InvalidAnswerGrade(format!(
                        "a reveal needs yes or no, got '{}'",
                        given
                    )));
                };
                session.record_verdict(q_index, accepted);

                if accepted {
                    info!("Session {} solved: item {} (forced: {})", session.id, item_id, forced);
                    session.state = SessionState::Success { item_id };
                    if session.bonus_applied {
                        return Ok(None);
                    }
                    session.bonus_applied = true;
                    return Ok(Some(item_id));
                }

                session.weights.scale(item_id, self.config.penalty_factor);
                session.rejected.insert(item_id);
                session.reveal_misses += 1;
                info!(
                    "Session {} reveal of item {} rejected ({}/{})",
                    session.id, item_id, session.reveal_misses, self.config.reveal_miss_limit
                );

                if session.reveal_misses >= self.config.reveal_miss_limit {
                    self.fail(session);
                } else {
                    self.advance(view, session)?;
                }
                Ok(None)
            }
            SessionState::Success { .. } | SessionState::FailList { .. } => {
                Err(EngineError::SessionTerminated(session.id.clone()))
            }
            SessionState::Created => {
                self.advance(view, session)?;
                Ok(None)
            }
        }
    }

    /// Decide the next question, reveal or failure from the current weights
    fn advance(&self, view: &CatalogView, session: &mut Session) -> Result<()> {
        if session.rejected.len() >= session.weights.len() {
            self.fail(session);
            return Ok(());
        }

        let probs = scorer::normalize(&session.weights)?;
        let metrics = Metrics::of(&probs);
        let top = match scorer::top_eligible(&probs, &session.rejected) {
            Some(top) => top,
            None => {
                self.fail(session);
                return Ok(());
            }
        };

        // gated on overall confidence; a rejected leader still counts
        if metrics.confidence >= self.config.reveal_threshold {
            let q_index = session.reveal(top.id, false);
            info!(
                "Session {} q{} reveals item {} at p={:.3} (confidence {:.3})",
                session.id, q_index, top.id, top.probability, metrics.confidence
            );
            return Ok(());
        }

        if session.question_count >= self.config.max_questions {
            let q_index = session.reveal(top.id, true);
            info!(
                "Session {} q{} forces reveal of item {} after {} questions",
                session.id, q_index, top.id, session.question_count
            );
            return Ok(());
        }

        let q_index = session.next_index();
        let touched = session.touched_tags();
        let used_hard = session.used_hard_confirms();
        let ctx = ConfirmContext {
            top: top.id,
            confidence: metrics.confidence,
            touched: &touched,
            used_hard: &used_hard,
        };
        let seed = session.seed;
        let coin = || self.random.coin_flip(seed, q_index);

        let mut next = None;
        if selector::should_insert_confirm(&self.config.confirm, q_index, &metrics) {
            next = selector::select_confirm(&self.config.confirm, view, &probs, &ctx, coin);
        }
        if next.is_none() {
            next = selector::select_explore(self.config, view, &probs, &touched, session.no_streak());
        }
        if next.is_none() {
            next = selector::select_confirm(&self.config.confirm, view, &probs, &ctx, coin);
        }

        match next {
            Some(question) => {
                debug!(
                    "Session {} q{}: {} (confidence {:.3}, effective {:.2})",
                    session.id, q_index, question, metrics.confidence, metrics.effective_candidates
                );
                session.pose(question);
            }
            None => {
                let q_index = session.reveal(top.id, true);
                info!(
                    "Session {} q{} has no question left, forcing reveal of item {}",
                    session.id, q_index, top.id
                );
            }
        }
        Ok(())
    }

    fn fail(&self, session: &mut Session) {
        let candidates = scorer::normalize(&session.weights)
            .map(|probs| scorer::ranked(&probs, &session.rejected, self.config.fail_list_size))
            .unwrap_or_default();
        info!(
            "Session {} failed after {} questions and {} missed reveals",
            session.id, session.question_count, session.reveal_misses
        );
        session.state = SessionState::FailList { candidates };
    }

    fn turn_of(&self, session: &Session) -> Result<Turn> {
        let (metrics, leaders) = match scorer::normalize(&session.weights) {
            Ok(probs) => (
                Some(Metrics::of(&probs)),
                scorer::ranked(&probs, &session.rejected, LEADERS),
            ),
            Err(_) => (None, Vec::new()),
        };
        Ok(Turn {
            session_id: session.id.clone(),
            state: session.state.clone(),
            question_count: session.question_count,
            reveal_misses: session.reveal_misses,
            metrics,
            leaders,
        })
    }
}
