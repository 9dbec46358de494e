//! Point-in-time health snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Result of one `/health` probe. Built fresh per probe, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(service: &str, details: Value) -> Self {
        Self {
            service: service.to_string(),
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            details: Some(details),
            error: None,
        }
    }

    pub fn unhealthy(service: &str, error: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            status: HealthStatus::Unhealthy,
            timestamp: Utc::now(),
            details: None,
            error: Some(error.into()),
        }
    }

    /// Equal ignoring the probe timestamp.
    pub fn same_state(&self, other: &ServiceHealth) -> bool {
        self.service == other.service
            && self.status == other.status
            && self.details == other.details
            && self.error == other.error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => f.write_str("healthy"),
            OverallStatus::Degraded => f.write_str("degraded"),
        }
    }
}

/// Aggregate over every registered service, keyed by service name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall_status: OverallStatus,
    pub healthy_services: usize,
    pub total_services: usize,
    pub services: BTreeMap<String, ServiceHealth>,
    pub timestamp: DateTime<Utc>,
}
