//! Reachability prober for user-registered HTTP services.
//!
//! Probes run through a transport that only skips certificate verification
//! for targets living entirely on private networks. Outcomes are written to
//! the service's live status and to an append-only status log, which the
//! metrics layer aggregates into reports and exposition text.

pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod metrics;
pub mod monitoring;
pub mod pool;
pub mod retention;
pub mod validation;

pub use config::Config;
pub use context::Nimbus;
pub use error::{CheckError, QueryError};
