//! Endpoint handlers.
//!
//! Every handler runs behind the admission pipeline; errors are returned as
//! [`GatewayError`] and rendered there with the request id.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::pipeline::RequestMeta;

/// Credential parameters never travel downstream.
const STRIPPED_PARAMS: &[&str] = &["api_key"];

/// `GET /health`: the gateway process itself.
pub async fn gateway_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "gateway",
        "timestamp": Utc::now(),
    }))
}

/// `GET /metrics`: Prometheus exposition.
pub async fn metrics(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| GatewayError::NotFound("Metrics are disabled".to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

/// `GET /api/system/health`
pub async fn system_health(State(state): State<AppState>) -> Json<Value> {
    let health = state.proxy.check_all().await;
    Json(json!(health))
}

/// `GET /api/system/status`
pub async fn system_status(State(state): State<AppState>) -> Json<Value> {
    let health = state.proxy.check_all().await;
    Json(json!({
        "system": {
            "name": "API Gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "overall_status": health.overall_status,
            "timestamp": health.timestamp,
        },
        "gateway": {
            "status": "healthy",
            "auth_mode": state.auth_mode,
            "started_at": state.started_at,
            "uptime_secs": (Utc::now() - state.started_at).num_seconds().max(0),
            "routes": state.routes.len(),
            "capabilities": [
                "API routing",
                "Authentication",
                "Rate limiting",
                "Security monitoring",
                "Request auditing",
                "Service proxy",
                "Health monitoring",
            ],
        },
        "services": health.services,
        "summary": {
            "healthy_services": health.healthy_services,
            "total_services": health.total_services,
            "availability_percentage": health.availability_percentage(),
        },
    }))
}

/// `GET /api/system/ping`
pub async fn system_ping() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Gateway is running",
        "service": "gateway",
    }))
}

/// `GET /api/health`: condensed view consumed by the CLI.
pub async fn api_health(State(state): State<AppState>) -> Json<Value> {
    let health = state.proxy.check_all().await;
    Json(json!({
        "status": health.overall_status,
        "timestamp": health.timestamp,
        "services": health.services,
        "healthy_services": health.healthy_services,
        "total_services": health.total_services,
    }))
}

/// `ANY /api/v1/{service}/{*path}`
pub async fn forward_service(
    State(state): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Path((service, path)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let path = format!("/{path}");
    forward(&state, &meta, &service, method, &path, query, body).await
}

/// `ANY /api/v1/{service}`
pub async fn forward_service_root(
    State(state): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Path(service): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    forward(&state, &meta, &service, method, "/", query, body).await
}

/// Fallback: the configured route table.
pub async fn route_table(
    State(state): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let (service, upstream_path) = {
        let matched = state
            .routes
            .match_path(uri.path())
            .ok_or_else(|| GatewayError::NotFound("No matching route found".to_string()))?;
        tracing::debug!(
            request_id = %meta.request_id,
            route = matched.route,
            service = matched.service,
            upstream_path = %matched.upstream_path,
            "Route matched"
        );
        (matched.service.to_string(), matched.upstream_path)
    };
    let query = uri.query().map(str::to_string);
    forward(&state, &meta, &service, method, &upstream_path, query, body).await
}

async fn forward(
    state: &AppState,
    meta: &RequestMeta,
    service: &str,
    method: Method,
    path: &str,
    query: Option<String>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let params = forwarded_params(query.as_deref());
    let body = json_body(&body)?;
    let value = state
        .proxy
        .forward_for(
            &meta.request_id,
            service,
            method,
            path,
            (!params.is_empty()).then_some(params.as_slice()),
            body.as_ref(),
        )
        .await?;
    Ok(Json(value))
}

fn forwarded_params(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .filter(|(k, _)| !STRIPPED_PARAMS.contains(&k.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

fn json_body(bytes: &[u8]) -> Result<Option<Value>, GatewayError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid JSON body: {e}")))
}
