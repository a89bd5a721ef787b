//! guesswork - adaptive guessing engine
//!
//! The player thinks of an item from a tagged catalog. The engine asks
//! graded yes/no questions, keeps a Bayesian-style weight per candidate,
//! and reveals its best guess once it is confident enough.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use guesswork::{SessionEngine, SqliteStore, EngineConfig, Gate, Answer};
//!
//! let store = SqliteStore::open(&db_path)?;
//! let config = EngineConfig::default();
//! let engine = SessionEngine::new(&store, &store, &config);
//!
//! let turn = engine.start(Gate::Either)?;
//! let turn = engine.answer(&turn.session_id, Answer::ProbablyYes)?;
//! let rollback = engine.rollback_to_question(&turn.session_id, 1)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                SessionEngine (engine)                │
//! │  start() → answer() → … → Success | FailList         │
//! │  rollback_to_question() → restore snapshot           │
//! └───────┬──────────────────┬───────────────────┬───────┘
//!         │                  │                   │
//!    selector            answer / scorer     session
//!    (which question)    (weight update)     (history, snapshots)
//!         │                                      │
//!         ▼                                      ▼
//! ┌──────────────────┐                 ┌──────────────────┐
//! │ CatalogProvider  │                 │SessionRepository │
//! │ SqliteStore /    │                 │ SqliteStore /    │
//! │ InMemoryCatalog  │                 │ InMemorySessions │
//! └──────────────────┘                 └──────────────────┘
//! ```

pub mod answer;
pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod repository;
pub mod scorer;
pub mod selector;
pub mod session;
pub mod simulation;
pub mod types;
pub mod weights;

// Core engine
pub use engine::{Rollback, SessionEngine, Turn};
pub use error::{EngineError, Result};
pub use types::*;

// Configuration
pub use config::{AnswerLikelihoods, ConfirmConfig, CoverageBand, EngineConfig, LikelihoodPair, SelectionStrategy};

// Storage ports and implementations
pub use catalog::{Catalog, CatalogProvider, CatalogView};
pub use db::{init_db, SessionStats, SqliteStore};
pub use repository::{InMemoryCatalog, InMemorySessions, SessionRepository};

// Session aggregate
pub use session::{HistoryEntry, Session, SessionState};

// Scoring and selection
pub use scorer::{Metrics, ProbabilityVector, RankedCandidate};
pub use selector::{FixedRandom, RandomSource, SeededRandom};
pub use weights::WeightVector;

// Self-play
pub use simulation::{run_simulation, SimulationConfig, SimulationResults};
