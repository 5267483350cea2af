//! Types shared by the vigil agent and collector.
//!
//! The agent produces [`types::MetricSample`]s, ships them as
//! [`types::WireMetric`] batches, and the collector folds them into a
//! [`types::MetricTable`]. Payload signing, the hybrid encryption envelope
//! and gzip live in [`codec`] so both sides agree on the exact bytes.
//! [`retry::RetryPolicy`] is the linear backoff both sides use for I/O
//! that may fail transiently.

pub mod codec;
pub mod error;
pub mod retry;
pub mod types;

pub use error::MetricError;
pub use retry::RetryPolicy;
pub use types::{
    format_counter, format_gauge, parse_counter, parse_gauge, MetricKind, MetricSample,
    MetricTable, Snapshot, SnapshotKind, WireMetric,
};
