//! Per-request state threaded through the admission stages.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request};
use chrono::{DateTime, Utc};

use crate::security::types::{Identity, RateLimitDecision, SecurityFinding};

/// Created at ingress, filled in stage by stage, dropped after the response is flushed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub body_size: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub start: Instant,
    pub identity: Option<Identity>,
    pub rate_limit: Option<RateLimitDecision>,
    pub findings: Vec<SecurityFinding>,
}

impl RequestContext {
    pub fn from_request<B>(request: &Request<B>, request_id: String, trust_forwarded: bool) -> Self {
        let headers = request.headers().clone();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            request_id,
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            client_ip: client_ip(&headers, peer, trust_forwarded),
            user_agent: header_str(&headers, header::USER_AGENT.as_str()).map(str::to_string),
            body_size: header_str(&headers, header::CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse().ok()),
            headers,
            started_at: Utc::now(),
            start: Instant::now(),
            identity: None,
            rate_limit: None,
            findings: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// Decoded query parameters; later duplicates win.
    pub fn query_params(&self) -> BTreeMap<String, String> {
        self.query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let q = self.query.as_deref()?;
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// X-Forwarded-For (first hop), then X-Real-IP, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<String>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
        if let Some(ip) = header_str(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty()) {
            return ip.to_string();
        }
    }
    peer.unwrap_or_else(|| "unknown".to_string())
}
