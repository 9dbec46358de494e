//! Types shared by the admission stages.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of security-relevant observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    BlockedAgent,
    SlowRequest,
    ErrorPattern,
    RateLimitExceeded,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::SqlInjection => "sql_injection",
            FindingCategory::Xss => "xss",
            FindingCategory::PathTraversal => "path_traversal",
            FindingCategory::CommandInjection => "command_injection",
            FindingCategory::BlockedAgent => "blocked_agent",
            FindingCategory::SlowRequest => "slow_request",
            FindingCategory::ErrorPattern => "error_pattern",
            FindingCategory::RateLimitExceeded => "rate_limit_exceeded",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A recorded observation. At most one per category per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub category: FindingCategory,
    pub severity: Severity,
    pub source_ip: String,
    pub description: String,
    pub details: BTreeMap<String, String>,
    pub request_id: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl SecurityFinding {
    pub fn new(
        category: FindingCategory,
        severity: Severity,
        source_ip: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            source_ip: source_ip.into(),
            description: description.into(),
            details: BTreeMap::new(),
            request_id: None,
            detected_at: Utc::now(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn for_request(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

/// Resolved caller principal. Read-only snapshot of the key store's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub key_id: String,
    pub name: String,
    pub permissions: BTreeSet<String>,
    pub rate_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// The principal every holder of the shared secret authenticates as.
    pub fn shared_secret() -> Self {
        Self {
            key_id: "shared-secret".to_string(),
            name: "shared-secret".to_string(),
            permissions: BTreeSet::from(["*".to_string()]),
            rate_limit: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Rate-limit dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketType {
    Ip,
    Identity,
}

impl BucketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketType::Ip => "ip",
            BucketType::Identity => "identity",
        }
    }
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one fixed-window check.
///
/// `allowed == (request_count <= limit)` and
/// `reset_time == window_start + window_duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub bucket_type: BucketType,
    pub identifier: String,
    pub allowed: bool,
    pub request_count: u32,
    pub limit: u32,
    #[serde(with = "duration_secs")]
    pub window_duration: Duration,
    pub reset_time: DateTime<Utc>,
    pub reason: String,
}

impl RateLimitDecision {
    pub fn new(
        bucket_type: BucketType,
        identifier: &str,
        request_count: u32,
        limit: u32,
        window_start: DateTime<Utc>,
        window_duration: Duration,
    ) -> Self {
        let allowed = request_count <= limit;
        let reason = if allowed {
            "within limit".to_string()
        } else {
            format!(
                "{} limit of {} requests per {}s exceeded",
                bucket_type,
                limit,
                window_duration.as_secs()
            )
        };
        let window = chrono::Duration::from_std(window_duration).unwrap_or(chrono::Duration::zero());
        Self {
            bucket_type,
            identifier: identifier.to_string(),
            allowed,
            request_count,
            limit,
            window_duration,
            reset_time: window_start + window,
            reason,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.request_count)
    }

    /// Whole seconds until the window resets, at least one.
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        let secs = (self.reset_time - now).num_seconds();
        secs.max(1) as u64
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
