/// Validation errors for metric kinds and raw values.
///
/// These are never retried: they surface to whoever supplied the metric.
///
/// # Examples
///
/// ```rust
/// use vigil_common::MetricError;
///
/// let err = MetricError::UnknownMetricKind("histogram".to_string());
/// assert!(err.to_string().contains("histogram"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// The metric type is neither `gauge` nor `counter`.
    #[error("unknown metric type: {0}")]
    UnknownMetricKind(String),

    /// The raw value cannot be parsed into the numeric type of its kind.
    #[error("bad {kind} value: {value:?}")]
    BadMetricValue { kind: &'static str, value: String },
}
