//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → monitor.rs   (signature scan, advisory only)
//!     → auth.rs      (resolve identity, never fails)
//!     → rate_limit.rs (ip bucket, then identity bucket)
//!     → auth.rs      (enforce protected paths)
//!     → handler
//!     → monitor.rs   (slow request, error-pattern checks)
//! ```
//!
//! # Design Decisions
//! - The monitor never blocks; only auth and rate-limit decisions fail a request
//! - Findings go to the incident store through the background writer
//! - No trust in client input: every check works on the raw request

pub mod auth;
pub mod monitor;
pub mod rate_limit;
pub mod types;

pub use auth::{AuthOutcome, AuthPolicy, Authenticator, PathClass};
pub use monitor::SecurityMonitor;
pub use rate_limit::RateLimiter;
pub use types::{BucketType, FindingCategory, Identity, RateLimitDecision, SecurityFinding, Severity};
