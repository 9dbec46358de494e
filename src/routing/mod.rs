//! Fallback route table.
//!
//! # Data Flow
//! ```text
//! Request path not claimed by a built-in endpoint
//!     → router.rs (route lookup)
//!     → matcher.rs (prefix match, upstream path rewrite)
//!     → Return: (service, upstream path) or no match (404)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by priority, then prefix length
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{RouteMatch, RouteTable};
