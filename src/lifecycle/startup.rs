//! Startup orchestration.
//!
//! # Responsibilities
//! - Build stores, the background writer and every admission stage
//! - Build the single outbound client and the service registry
//! - Assemble the router
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Components receive their configuration and collaborators through constructors
//! - Listeners start last (traffic only when ready), see `main.rs`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::audit::RequestAuditor;
use crate::config::{ConfigError, GatewayConfig};
use crate::http::{build_router, AppState};
use crate::pipeline::AdmissionPipeline;
use crate::proxy::{build_client, ServiceProxy, ServiceRegistry};
use crate::routing::RouteTable;
use crate::security::{AuthPolicy, Authenticator, RateLimiter, SecurityMonitor};
use crate::stores::{
    InMemoryApiKeyStore, InMemoryAuditStore, InMemoryIncidentStore, InMemoryRateLimitStore,
    StoreWriter,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid service registry: {0}")]
    Registry(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The in-memory collaborator stores backing a gateway instance.
#[derive(Clone)]
pub struct GatewayStores {
    pub api_keys: Arc<InMemoryApiKeyStore>,
    pub rate_limits: Arc<InMemoryRateLimitStore>,
    pub incidents: Arc<InMemoryIncidentStore>,
    pub audits: Arc<InMemoryAuditStore>,
}

impl GatewayStores {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            api_keys: Arc::new(InMemoryApiKeyStore::from_config(&config.auth.api_keys)),
            rate_limits: Arc::new(InMemoryRateLimitStore::new()),
            incidents: Arc::new(InMemoryIncidentStore::new()),
            audits: Arc::new(InMemoryAuditStore::new()),
        }
    }
}

/// A fully wired gateway, ready to serve.
pub struct Gateway {
    pub router: axum::Router,
    pub writer: StoreWriter,
    pub writer_task: JoinHandle<()>,
    pub stores: GatewayStores,
}

/// Wire every component. Must run inside a Tokio runtime (spawns the writer task).
pub fn build_gateway(
    config: &GatewayConfig,
    stores: GatewayStores,
    metrics: Option<PrometheusHandle>,
) -> Result<Gateway, StartupError> {
    let (writer, writer_task) = StoreWriter::spawn(
        stores.incidents.clone(),
        stores.audits.clone(),
        config.audit.queue_capacity,
    );

    let policy = AuthPolicy::from_config(&config.auth, stores.api_keys.clone());
    tracing::info!(
        auth_mode = policy.name(),
        api_keys = stores.api_keys.len(),
        "Authentication configured"
    );
    let auth_mode = policy.name();

    let pipeline = Arc::new(AdmissionPipeline::new(
        SecurityMonitor::new(&config.security, writer.clone()),
        RateLimiter::new(
            config.rate_limit.clone(),
            stores.rate_limits.clone(),
            writer.clone(),
        ),
        Authenticator::new(policy, &config.auth),
        RequestAuditor::new(writer.clone()),
        config.listener.trust_forwarded_headers,
    ));

    let proxy = ServiceProxy::new(
        build_client(&config.timeouts)?,
        ServiceRegistry::from_config(&config.services)?,
        Duration::from_secs(config.health.timeout_secs),
    );
    tracing::info!(
        services = proxy.registry().len(),
        routes = config.routes.0.len(),
        "Service registry loaded"
    );

    let state = AppState {
        proxy: Arc::new(proxy),
        routes: Arc::new(RouteTable::from_config(&config.routes.0)),
        metrics,
        auth_mode,
        started_at: Utc::now(),
    };

    Ok(Gateway {
        router: build_router(config, state, pipeline),
        writer,
        writer_task,
        stores,
    })
}
