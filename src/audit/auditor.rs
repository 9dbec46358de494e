//! Request lifecycle auditing.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::types::{AuditCompletion, AuditRecord};
use crate::pipeline::context::RequestContext;
use crate::stores::StoreWriter;

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_HEADERS: &[&str] = &["authorization", "proxy-authorization", "x-api-key", "cookie"];
const SENSITIVE_PARAMS: &[&str] = &["api_key"];

/// Path prefix → target service label, checked in order.
const SERVICE_PREFIXES: &[(&str, &str)] = &[
    ("/task", "task-manager"),
    ("/cluster", "cluster-manager"),
    ("/model", "model-manager"),
    ("/worker", "worker"),
];

pub struct RequestAuditor {
    writer: StoreWriter,
}

impl RequestAuditor {
    pub fn new(writer: StoreWriter) -> Self {
        Self { writer }
    }

    /// Globally unique id assigned before any other stage runs.
    pub fn next_request_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("req_{}", &id[..16])
    }

    /// Queue the start record and return the request id it is keyed by.
    pub fn start(&self, ctx: &RequestContext) -> String {
        let record = AuditRecord {
            request_id: ctx.request_id.clone(),
            method: ctx.method.to_string(),
            path: ctx.path.clone(),
            query_params: redact_params(ctx.query_params()),
            headers: redact_headers(ctx),
            client_ip: ctx.client_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            body_size: ctx.body_size,
            target_service: target_service(&ctx.path),
            auth_user: ctx.identity.as_ref().map(|i| i.name.clone()),
            auth_key_id: ctx.identity.as_ref().map(|i| i.key_id.clone()),
            started_at: ctx.started_at,
        };

        tracing::info!(
            request_id = %record.request_id,
            method = %record.method,
            path = %record.path,
            client_ip = %record.client_ip,
            target_service = %record.target_service,
            "Request started"
        );
        self.writer.audit_start(record);
        ctx.request_id.clone()
    }

    pub fn complete(
        &self,
        request_id: &str,
        status_code: u16,
        response_size: Option<u64>,
        elapsed: Duration,
        error_message: Option<String>,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match &error_message {
            Some(error) => tracing::warn!(
                request_id,
                status_code,
                elapsed_ms,
                error = %error,
                "Request failed"
            ),
            None => tracing::info!(request_id, status_code, elapsed_ms, "Request completed"),
        }

        self.writer.audit_complete(AuditCompletion {
            request_id: request_id.to_string(),
            status_code,
            response_size,
            elapsed_ms,
            error_message,
            completed_at: Utc::now(),
        });
    }
}

/// Service label for a path: `/api/v1/{service}/...`, then the prefix table, then `gateway`.
pub fn target_service(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/v1/") {
        if let Some(service) = rest.split('/').next().filter(|s| !s.is_empty()) {
            return service.to_string();
        }
    }
    SERVICE_PREFIXES
        .iter()
        .find(|(prefix, _)| path.starts_with(prefix))
        .map(|(_, service)| service.to_string())
        .unwrap_or_else(|| "gateway".to_string())
}

fn redact_headers(ctx: &RequestContext) -> BTreeMap<String, String> {
    ctx.headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_string();
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name, value)
        })
        .collect()
}

fn redact_params(mut params: BTreeMap<String, String>) -> BTreeMap<String, String> {
    for key in SENSITIVE_PARAMS {
        if let Some(value) = params.get_mut(*key) {
            *value = REDACTED.to_string();
        }
    }
    params
}
