//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up layers (trace, admission, body limit, timeout, panic capture)
//! - Serve on a bound listener until shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::handlers;
use crate::pipeline::{admission, AdmissionPipeline};
use crate::proxy::ServiceProxy;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ServiceProxy>,
    pub routes: Arc<RouteTable>,
    pub metrics: Option<PrometheusHandle>,
    pub auth_mode: &'static str,
    pub started_at: DateTime<Utc>,
}

/// Build the Axum router. Layers, innermost first:
/// panic capture → timeout → body limit → admission pipeline → trace.
///
/// The body limit sits inside admission so oversized requests are still counted and audited.
#[allow(deprecated)]
pub fn build_router(config: &GatewayConfig, state: AppState, pipeline: Arc<AdmissionPipeline>) -> Router {
    Router::new()
        .route("/health", get(handlers::gateway_health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/health", get(handlers::api_health))
        .route("/api/system/health", get(handlers::system_health))
        .route("/api/system/status", get(handlers::system_status))
        .route("/api/system/ping", get(handlers::system_ping))
        .route("/api/v1/{service}", any(handlers::forward_service_root))
        .route("/api/v1/{service}/{*path}", any(handlers::forward_service))
        .fallback(handlers::route_table)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(middleware::from_fn_with_state(pipeline, admission))
        .layer(TraceLayer::new_for_http())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    GatewayError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
