//! Durable projections of a request written by the auditor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Start-of-request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub query_params: BTreeMap<String, String>,
    /// Credentials are redacted before they reach this map.
    pub headers: BTreeMap<String, String>,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub body_size: Option<u64>,
    pub target_service: String,
    pub auth_user: Option<String>,
    pub auth_key_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// End-of-request record, keyed by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditCompletion {
    pub request_id: String,
    pub status_code: u16,
    pub response_size: Option<u64>,
    pub elapsed_ms: u64,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}
