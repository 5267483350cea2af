//! The vigil sampling agent.
//!
//! Samplers run on their own timers and feed a merged snapshot stream.
//! The [`engine::Engine`] folds snapshots into an aggregation window and, on
//! every report tick, hands a [`window::DispatchJob`] to a bounded worker
//! pool. Workers encode the batch (sign, seal, gzip) and post it to the
//! collector with retry. [`drain::DrainController`] stops dispatch and waits
//! for in-flight deliveries on shutdown.

pub mod agent;
pub mod config;
pub mod delivery;
pub mod drain;
pub mod engine;
pub mod error;
pub mod sampling;
pub mod sender;
pub mod state;
pub mod window;

pub use agent::Agent;
pub use config::AgentConfig;
pub use error::AgentError;
