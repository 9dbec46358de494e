//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, forwarded header trust).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logical service name to base URL.
    pub services: ServicesConfig,

    /// Path-prefix route table used when no explicit route matches.
    pub routes: RoutesConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Authentication configuration.
    pub auth: AuthConfig,

    /// Security monitoring settings.
    pub security: SecurityConfig,

    /// Audit persistence settings.
    pub audit: AuditConfig,

    /// Downstream health probing.
    pub health: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Take the client IP from X-Forwarded-For / X-Real-IP when present.
    pub trust_forwarded_headers: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            trust_forwarded_headers: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout for downstream calls in seconds.
    pub connect_secs: u64,

    /// Total time allowed for one downstream call in seconds.
    pub upstream_secs: u64,

    /// Inbound request timeout (whole pipeline) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 120,
        }
    }
}

/// Service registry entries: name -> base URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ServicesConfig(pub BTreeMap<String, String>);

impl Default for ServicesConfig {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("model-manager".to_string(), "http://localhost:8085".to_string()),
            ("task-manager".to_string(), "http://localhost:8084".to_string()),
            ("cluster-manager".to_string(), "http://localhost:8083".to_string()),
        ]))
    }
}

/// Route table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RoutesConfig(pub Vec<RouteConfig>);

impl Default for RoutesConfig {
    fn default() -> Self {
        Self(vec![
            RouteConfig::new("models", "/api/models", "model-manager", "/models"),
            RouteConfig::new("tasks", "/api/tasks", "task-manager", "/tasks"),
            RouteConfig::new("workers", "/api/workers", "cluster-manager", "/workers"),
            RouteConfig::new("cluster", "/api/cluster", "cluster-manager", "/cluster"),
        ])
    }
}

/// Route configuration mapping a gateway path prefix onto a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Gateway path prefix to match.
    pub path_prefix: String,

    /// Registered service to forward to.
    pub service: String,

    /// Prefix substituted for `path_prefix` on the downstream call.
    #[serde(default)]
    pub upstream_prefix: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

impl RouteConfig {
    pub fn new(name: &str, path_prefix: &str, service: &str, upstream_prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            service: service.to_string(),
            upstream_prefix: upstream_prefix.to_string(),
            priority: 0,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Requests per window for an unauthenticated source IP.
    pub ip_limit: u32,

    /// Requests per window for a resolved identity.
    pub identity_limit: u32,

    /// Paths (exact match) that never touch the limiter.
    pub exempt_paths: BTreeSet<String>,

    /// Admit requests when the counter store is unreachable.
    pub fail_open: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 3600,
            ip_limit: 60,
            identity_limit: 1000,
            exempt_paths: ["/health", "/metrics"].iter().map(|p| p.to_string()).collect(),
            fail_open: true,
        }
    }
}

/// Authentication mode selected at startup.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    SharedSecret,
    Keyed,
}

/// How paths that are neither public nor under a protected prefix are treated.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedPolicy {
    Protected,
    Public,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Token compared against `Authorization: Bearer` in shared-secret mode.
    pub shared_secret: Option<String>,

    /// Paths (exact match) that bypass authentication.
    pub public_paths: BTreeSet<String>,

    /// Path prefixes that always require a credential.
    pub protected_prefixes: Vec<String>,

    pub unclassified: UnclassifiedPolicy,

    /// Keys loaded into the in-memory key store in keyed mode.
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Open,
            shared_secret: None,
            public_paths: [
                "/health",
                "/metrics",
                "/docs",
                "/openapi.json",
                "/redoc",
                "/api/health",
                "/api/system/health",
                "/api/system/ping",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            protected_prefixes: vec![
                "/api/".to_string(),
                "/admin/".to_string(),
                "/manage/".to_string(),
            ],
            unclassified: UnclassifiedPolicy::Protected,
            api_keys: Vec::new(),
        }
    }
}

/// A statically provisioned API key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub key_id: String,
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Overrides `rate_limit.identity_limit` for this key.
    #[serde(default)]
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Security monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Requests slower than this produce a slow_request finding.
    pub slow_request_secs: u64,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Scanner user agents in addition to the built-in list.
    pub extra_blocked_agents: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            slow_request_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
            extra_blocked_agents: Vec::new(),
        }
    }
}

/// Audit persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Capacity of the background write queue shared by audit and incident records.
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Health probe timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Serve Prometheus metrics on `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}
