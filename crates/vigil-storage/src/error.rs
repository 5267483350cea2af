use vigil_common::{MetricError, MetricKind};

/// Errors that can occur within the storage layer.
///
/// [`StorageError::Metric`] and [`StorageError::NotFound`] describe bad
/// input; every other variant means the persistence backend failed.
///
/// # Examples
///
/// ```rust
/// use vigil_common::MetricKind;
/// use vigil_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Counter,
///     key: "PollCount".to_string(),
/// };
/// assert!(err.to_string().contains("PollCount"));
/// assert!(!err.is_backend_failure());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric kind or raw value failed validation.
    #[error("Storage: {0}")]
    Metric(#[from] MetricError),

    /// No metric of this kind has been recorded under the key.
    #[error("Storage: {kind} {key} not found")]
    NotFound { kind: MetricKind, key: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The snapshot file could not be encoded or decoded.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic backend failure for cases not covered by other variants.
    #[error("Storage: backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// True when the failure lies in the persistence backend rather than in
    /// the caller's input.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, StorageError::Metric(_) | StorageError::NotFound { .. })
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
