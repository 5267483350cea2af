use vigil_common::codec::CodecError;
use vigil_common::MetricError;

/// Errors surfaced by the agent engine, its workers and the drain controller.
///
/// # Examples
///
/// ```rust
/// use vigil_agent::error::AgentError;
///
/// let err = AgentError::Rejected { status: 400 };
/// assert!(!err.is_transient());
/// assert!(AgentError::Transport("connection refused".into()).is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The engine observed a drain request and closed its dispatch queue.
    #[error("Agent: engine closed")]
    Closed,

    /// Workers were still running when the drain deadline passed.
    #[error("Agent: drain deadline reached with {active} worker(s) still active")]
    DrainDeadline { active: usize },

    /// The collector could not be reached or the request timed out.
    #[error("Agent: transport error: {0}")]
    Transport(String),

    /// The collector answered with a server-side error status.
    #[error("Agent: collector unavailable (status {status})")]
    Unavailable { status: u16 },

    /// The collector refused the batch.
    #[error("Agent: collector rejected batch (status {status})")]
    Rejected { status: u16 },

    #[error("Agent: {0}")]
    Codec(#[from] CodecError),

    #[error("Agent: {0}")]
    Metric(#[from] MetricError),

    #[error("Agent: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether a delivery attempt that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transport(_) | AgentError::Unavailable { .. })
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
