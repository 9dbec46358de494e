//! Health aggregation subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceProxy::check_all
//!     → probe "/health" on every registered service (concurrently)
//!     → types.rs (ServiceHealth per probe)
//!     → aggregate.rs (SystemHealth: healthy iff all healthy, else degraded)
//! ```
//!
//! # Design Decisions
//! - Point-in-time: nothing is cached between calls
//! - A failed probe is data (unhealthy), never an error
//! - Services keyed by name in a sorted map so output is deterministic

pub mod aggregate;
pub mod types;

pub use types::{HealthStatus, OverallStatus, ServiceHealth, SystemHealth};
