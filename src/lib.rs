//! API gateway library.
//!
//! ```text
//!   client ──▶ http (axum) ──▶ pipeline ─────────────────────────────▶ handlers ──▶ proxy ──▶ services
//!                              │ security monitor (pre)                  │
//!                              │ auth resolve → rate limiter → enforce   └─▶ health aggregation
//!                              │ auditor start / complete
//!                              │ security monitor (post)
//!                              ▼
//!                         stores::StoreWriter ──▶ incident / audit stores
//! ```

// Request path
pub mod error;
pub mod http;
pub mod pipeline;
pub mod proxy;
pub mod routing;

// Admission stages
pub mod audit;
pub mod security;

// Collaborators and shared views
pub mod health;
pub mod stores;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{ErrorClass, GatewayError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
