//! Downstream forwarding and health probing.
//!
//! # Error mapping
//! ```text
//! unknown service name        → UnknownService (500)
//! downstream 4xx / 5xx        → Downstream { same status, body in detail }
//! connect failure / timeout   → Unavailable (503)
//! ```

pub mod client;
pub mod registry;

use std::time::{Duration, Instant};

use axum::http::Method;
use futures_util::future::join_all;
use serde_json::Value;

use crate::error::GatewayError;
use crate::health::{ServiceHealth, SystemHealth};
use crate::observability::metrics;

pub use client::build_client;
pub use registry::ServiceRegistry;

const HEALTH_PATH: &str = "/health";

pub struct ServiceProxy {
    client: reqwest::Client,
    registry: ServiceRegistry,
    health_timeout: Duration,
}

impl ServiceProxy {
    pub fn new(client: reqwest::Client, registry: ServiceRegistry, health_timeout: Duration) -> Self {
        Self {
            client,
            registry,
            health_timeout,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub async fn forward(
        &self,
        service: &str,
        method: Method,
        path: &str,
        params: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        self.send(service, method, path, params, body, None, None).await
    }

    /// Like [`forward`](Self::forward), tagging the call with the inbound request id.
    pub async fn forward_for(
        &self,
        request_id: &str,
        service: &str,
        method: Method,
        path: &str,
        params: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        self.send(service, method, path, params, body, Some(request_id), None)
            .await
    }

    /// Probe `/health`. Failures become an unhealthy snapshot.
    pub async fn check_health(&self, service: &str) -> ServiceHealth {
        let result = self
            .send(
                service,
                Method::GET,
                HEALTH_PATH,
                None,
                None,
                None,
                Some(self.health_timeout),
            )
            .await;

        let health = match result {
            Ok(details) => ServiceHealth::healthy(service, details),
            Err(e) => ServiceHealth::unhealthy(service, e.to_string()),
        };
        metrics::record_service_health(service, health.status.is_healthy());
        health
    }

    /// Probe every registered service concurrently.
    pub async fn check_all(&self) -> SystemHealth {
        let probes = join_all(self.registry.names().map(|name| self.check_health(name))).await;
        let health = SystemHealth::aggregate(probes);
        tracing::debug!(
            overall = %health.overall_status,
            healthy = health.healthy_services,
            total = health.total_services,
            "Service health checked"
        );
        health
    }

    #[allow(clippy::too_many_arguments)]
    async fn send(
        &self,
        service: &str,
        method: Method,
        path: &str,
        params: Option<&[(String, String)]>,
        body: Option<&Value>,
        request_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value, GatewayError> {
        let url = self
            .registry
            .endpoint(service, path)
            .ok_or_else(|| GatewayError::UnknownService(service.to_string()))?;

        tracing::info!(
            service,
            method = %method,
            url = %url,
            request_id = request_id.unwrap_or("-"),
            "Proxying request"
        );

        let start = Instant::now();
        let mut request = self.client.request(method, &url);
        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(id) = request_id {
            request = request.header("x-request-id", id);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.unavailable(service, &url, start, e)),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.unavailable(service, &url, start, e)),
        };

        if status.is_client_error() || status.is_server_error() {
            let text = String::from_utf8_lossy(&bytes);
            tracing::error!(
                service,
                url = %url,
                status_code = status.as_u16(),
                "Service request failed"
            );
            metrics::record_upstream(service, "error_status", start);
            return Err(GatewayError::Downstream {
                status,
                detail: format!("Service {service} error: {text}"),
            });
        }

        metrics::record_upstream(service, "success", start);
        Ok(parse_body(&bytes))
    }

    fn unavailable(&self, service: &str, url: &str, start: Instant, e: reqwest::Error) -> GatewayError {
        tracing::error!(
            service,
            url,
            timeout = e.is_timeout(),
            error = %e,
            "Service connection failed"
        );
        metrics::record_upstream(service, "unavailable", start);
        GatewayError::Unavailable(format!("Service {service} unavailable: {e}"))
    }
}

/// JSON when it parses, `null` when empty, the raw text otherwise.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
