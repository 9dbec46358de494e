//! Collaborator store contracts.
//!
//! # Data Flow
//! ```text
//! Authenticator ──validate──▶ ApiKeyStore
//! RateLimiter   ──check────▶ RateLimitStore   (atomic check-and-increment per bucket)
//! Monitor/Limiter ─submit─▶ StoreWriter ──▶ IncidentStore
//! Auditor       ──submit──▶ StoreWriter ──▶ AuditStore
//! ```
//!
//! # Design Decisions
//! - Durable storage lives outside the gateway; only these traits are required
//! - Incident and audit writes never run on the request path (see writer.rs)
//! - `memory.rs` provides process-local implementations for single-node use and tests

pub mod memory;
pub mod writer;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::audit::types::{AuditCompletion, AuditRecord};
use crate::security::types::{BucketType, Identity, RateLimitDecision, SecurityFinding};

pub use memory::{InMemoryApiKeyStore, InMemoryAuditStore, InMemoryIncidentStore, InMemoryRateLimitStore};
pub use writer::StoreWriter;

/// Failure reported by a collaborator store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected the operation: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Resolve a raw credential. `client_ip` and `user_agent` are passed for the store's own audit.
    async fn validate(
        &self,
        key: &str,
        client_ip: &str,
        user_agent: Option<&str>,
    ) -> Result<Option<Identity>, StoreError>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `(bucket_type, identifier)` and report the window state.
    async fn check(
        &self,
        bucket_type: BucketType,
        identifier: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, StoreError>;
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Persist a finding, returning the incident id.
    async fn create(&self, finding: &SecurityFinding) -> Result<String, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist the start record, returning the store's id for it.
    async fn start(&self, record: &AuditRecord) -> Result<String, StoreError>;

    async fn complete(&self, completion: &AuditCompletion) -> Result<(), StoreError>;
}
