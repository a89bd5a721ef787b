//! Error types for the guessing engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything the engine can surface to its caller.
///
/// "No question available" is deliberately absent: the state machine
/// recovers from it by forcing a reveal or failing the session.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The gate left no candidate to play with
    #[error("Empty catalog: no candidate survives the gate")]
    EmptyCatalog,

    /// Weights sum to zero (or are not finite), so no distribution exists
    #[error("Degenerate weights: total mass is {0}")]
    DegenerateWeights(f64),

    /// No session stored under this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A question descriptor the engine cannot evaluate
    #[error("Unknown question kind: {0}")]
    UnknownQuestionKind(String),

    /// An answer grade outside the ordinal scale, or not valid in this state
    #[error("Invalid answer grade: {0}")]
    InvalidAnswerGrade(String),

    /// No snapshot exists at or before the requested index
    #[error("Rollback target unavailable: no snapshot at or before question {0}")]
    RollbackTargetUnavailable(u32),

    /// The session already reached Success or FailList
    #[error("Session {0} is terminated")]
    SessionTerminated(String),

    /// Another writer updated the session since it was read
    #[error("Stale session {id}: expected version {expected}")]
    StaleSession { id: String, expected: u64 },

    /// An unsigned count does not fit the database's signed integers
    #[error("Value out of range for storage: {0}")]
    ValueOutOfRange(u64),

    /// Configuration failed to parse or validate
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
