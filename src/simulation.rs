//! Monte Carlo self-play
//!
//! Runs many simulated games against a catalog to measure how the engine
//! behaves under a given configuration:
//! - how often it finds the hidden item
//! - how many questions and missed reveals it needs
//! - how often it runs out of questions and has to guess

use crate::answer::possesses;
use crate::catalog::{Catalog, CatalogView};
use crate::config::EngineConfig;
use crate::engine::SessionEngine;
use crate::error::Result;
use crate::repository::{InMemoryCatalog, InMemorySessions, SessionRepository};
use crate::session::SessionState;
use crate::types::{Answer, Gate, Item, ItemId};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for a simulation run
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of games to play
    pub num_runs: u32,

    /// Random seed for reproducibility (None = random)
    pub seed: Option<u64>,

    pub gate: Gate,

    /// Probability that the simulated player shrugs ("don't know") at a question
    pub answer_noise: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_runs: 1000,
            seed: None,
            gate: Gate::Either,
            answer_noise: 0.0,
        }
    }
}

/// Aggregate results of a simulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResults {
    pub num_runs: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub mean_questions: f64,

    /// 95% confidence interval for the mean question count
    pub confidence_interval_95: (f64, f64),

    pub max_questions: u32,
    pub mean_reveal_misses: f64,

    /// Reveals made because the engine ran out of questions or budget
    pub forced_reveals: u32,

    pub fail_lists: u32,
}

/// Outcome of one simulated game
#[derive(Debug, Clone, PartialEq)]
struct Game {
    solved: bool,
    questions: u32,
    reveal_misses: u32,
    forced_reveals: u32,
}

/// Play `num_runs` games against a private copy of `catalog`
pub fn run_simulation(
    catalog: &Catalog,
    engine_config: &EngineConfig,
    config: &SimulationConfig,
) -> Result<SimulationResults> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // play bonuses land in the copy, never in the caller's catalog
    let provider = InMemoryCatalog::new(catalog.clone());
    let sessions = InMemorySessions::new();
    let engine = SessionEngine::new(&provider, &sessions, engine_config);

    let mut games = Vec::with_capacity(config.num_runs as usize);
    for run in 0..config.num_runs {
        let view = CatalogView::load(&provider, config.gate)?;
        let candidates: Vec<&Item> = view.items().collect();
        let target = pick_target(&candidates, &mut rng);

        let game = play_game(&engine, &sessions, &view, target, config, &mut rng)?;
        debug!(
            "Run {}: target {}, solved {}, {} questions",
            run, target, game.solved, game.questions
        );
        games.push(game);
    }

    let results = summarize(config.num_runs, &games);
    info!(
        "Simulated {} games: {:.1}% solved, {:.2} questions on average",
        results.num_runs,
        results.success_rate * 100.0,
        results.mean_questions
    );
    Ok(results)
}

/// Popularity-weighted pick, the way real players choose what to think of
fn pick_target(candidates: &[&Item], rng: &mut StdRng) -> ItemId {
    let total_weight: f64 = candidates.iter().map(|item| item.popularity() as f64 + 1.0).sum();
    let mut roll: f64 = rng.gen::<f64>() * total_weight;

    for item in candidates {
        roll -= item.popularity() as f64 + 1.0;
        if roll <= 0.0 {
            return item.id;
        }
    }

    // Fallback for rounding at the top end
    candidates.last().map(|item| item.id).unwrap_or_default()
}

fn play_game<R: SessionRepository>(
    engine: &SessionEngine<'_, InMemoryCatalog, R>,
    sessions: &R,
    view: &CatalogView,
    target: ItemId,
    config: &SimulationConfig,
    rng: &mut StdRng,
) -> Result<Game> {
    let limits = engine.config();
    let max_steps = 2 * (limits.max_questions + limits.reveal_miss_limit) + 8;

    let mut turn = engine.start_with_seed(config.gate, rng.gen())?;
    for _ in 0..max_steps {
        let answer = match &turn.state {
            SessionState::Quiz { question, .. } | SessionState::Confirm { question, .. } => {
                if rng.gen::<f64>() < config.answer_noise {
                    Answer::Unknown
                } else if possesses(view, target, question) {
                    Answer::Yes
                } else {
                    Answer::No
                }
            }
            SessionState::Reveal { item_id, .. } if *item_id == target => Answer::Yes,
            SessionState::Reveal { .. } => Answer::No,
            SessionState::Success { .. } | SessionState::FailList { .. } | SessionState::Created => break,
        };
        turn = engine.answer(&turn.session_id, answer)?;
    }

    let session = sessions.get(&turn.session_id)?;
    Ok(Game {
        solved: matches!(turn.state, SessionState::Success { item_id } if item_id == target),
        questions: session.question_count,
        reveal_misses: session.reveal_misses,
        forced_reveals: session.forced_reveals() as u32,
    })
}

fn summarize(num_runs: u32, games: &[Game]) -> SimulationResults {
    if games.is_empty() {
        return SimulationResults {
            num_runs,
            successes: 0,
            success_rate: 0.0,
            mean_questions: 0.0,
            confidence_interval_95: (0.0, 0.0),
            max_questions: 0,
            mean_reveal_misses: 0.0,
            forced_reveals: 0,
            fail_lists: 0,
        };
    }

    let n = games.len() as f64;
    let successes = games.iter().filter(|g| g.solved).count() as u32;

    let questions: Vec<f64> = games.iter().map(|g| g.questions as f64).collect();
    let mean_questions = questions.iter().sum::<f64>() / n;
    let variance = questions.iter().map(|q| (q - mean_questions).powi(2)).sum::<f64>() / n;

    // 95% CI: mean ± 1.96 * std_error
    let std_error = variance.sqrt() / n.sqrt();

    SimulationResults {
        num_runs,
        successes,
        success_rate: successes as f64 / n,
        mean_questions,
        confidence_interval_95: (mean_questions - 1.96 * std_error, mean_questions + 1.96 * std_error),
        max_questions: games.iter().map(|g| g.questions).max().unwrap_or(0),
        mean_reveal_misses: games.iter().map(|g| g.reveal_misses as f64).sum::<f64>() / n,
        forced_reveals: games.iter().map(|g| g.forced_reveals).sum(),
        fail_lists: games.len() as u32 - successes,
    }
}
