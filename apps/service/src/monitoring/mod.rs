/// Probing engine
///
/// - `classifier` decides whether a target may skip certificate verification
/// - `transport` sends the request with the matching client
/// - `checker` classifies the outcome and persists it
/// - `scheduler` triggers batches periodically
pub mod checker;
pub mod classifier;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use checker::{BatchSummary, HealthChecker, ProbeDeadline};
pub use classifier::{DnsCache, HostResolver, NetworkClassifier, SystemResolver};
pub use scheduler::CheckScheduler;
pub use transport::{ProbeTransport, TransportOptions};
pub use types::{ProbeFailure, ProbeOutcome, Service, ServiceId, ServiceStatus, UserId};
