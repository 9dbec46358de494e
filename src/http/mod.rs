//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → pipeline (admission: security, rate limit, auth, audit)
//!     → handlers.rs (system endpoints, /api/v1 forwarding, route table)
//!     → proxy (downstream call)
//!     → Send to client
//! ```

pub mod handlers;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
