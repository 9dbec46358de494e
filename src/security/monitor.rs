//! Attack-signature and anomaly detection.
//!
//! Advisory only: the monitor never rejects a request. Findings are handed to the
//! incident store through the background writer.

use std::time::Duration;

use axum::http::StatusCode;

use crate::config::SecurityConfig;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::security::types::{FindingCategory, SecurityFinding, Severity};
use crate::stores::StoreWriter;

const SQL_INJECTION: &[&str] = &[
    "union select",
    "drop table",
    "insert into",
    "delete from",
    "update set",
    "exec(",
    "execute(",
    "sp_executesql",
    "' or '",
    "' or 1=1",
    "\" or \"",
];

const XSS: &[&str] = &[
    "<script",
    "javascript:",
    "onload=",
    "onerror=",
    "onclick=",
    "onmouseover=",
    "alert(",
    "document.cookie",
];

const PATH_TRAVERSAL: &[&str] = &["../", "..\\", "..%2f", "..%5c", "%2e%2e%2f", "%2e%2e%5c"];

const COMMAND_INJECTION: &[&str] = &[
    "; cat", "| cat", "& cat", "; ls", "| ls", "& ls", "; wget", "| wget", "& wget", "; curl",
    "| curl",
];

const BLOCKED_AGENTS: &[&str] = &[
    "nikto",
    "sqlmap",
    "nmap",
    "masscan",
    "nessus",
    "burpsuite",
    "w3af",
    "skipfish",
    "gobuster",
];

const SIGNATURES: &[(FindingCategory, Severity, &[&str])] = &[
    (FindingCategory::SqlInjection, Severity::High, SQL_INJECTION),
    (FindingCategory::Xss, Severity::Medium, XSS),
    (FindingCategory::PathTraversal, Severity::Medium, PATH_TRAVERSAL),
    (FindingCategory::CommandInjection, Severity::High, COMMAND_INJECTION),
];

pub struct SecurityMonitor {
    blocked_agents: Vec<String>,
    slow_threshold: Duration,
    writer: StoreWriter,
}

impl SecurityMonitor {
    pub fn new(config: &SecurityConfig, writer: StoreWriter) -> Self {
        let blocked_agents = BLOCKED_AGENTS
            .iter()
            .map(|a| a.to_string())
            .chain(config.extra_blocked_agents.iter().map(|a| a.to_lowercase()))
            .collect();
        Self {
            blocked_agents,
            slow_threshold: Duration::from_secs(config.slow_request_secs),
            writer,
        }
    }

    /// Signature scan of the raw request. Emits and returns the findings.
    pub fn inspect_request(&self, ctx: &RequestContext) -> Vec<SecurityFinding> {
        let raw_query = ctx.query.as_deref().unwrap_or_default();
        // Raw text keeps encoded traversal sequences visible; the decoded copy exposes
        // quotes and spaces that clients percent-encode.
        let decoded_query: String = url::form_urlencoded::parse(raw_query.as_bytes())
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let haystack = format!("{} {} {}", ctx.path, raw_query, decoded_query).to_lowercase();

        let mut findings = Vec::new();

        if let Some(agent) = ctx.user_agent.as_deref() {
            let lowered = agent.to_lowercase();
            if let Some(hit) = self.blocked_agents.iter().find(|b| lowered.contains(b.as_str())) {
                findings.push(
                    SecurityFinding::new(
                        FindingCategory::BlockedAgent,
                        Severity::High,
                        &ctx.client_ip,
                        format!("Blocked user agent detected: {agent}"),
                    )
                    .detail("user_agent", agent)
                    .detail("matched", hit.as_str())
                    .detail("path", &ctx.path),
                );
            }
        }

        for (category, severity, patterns) in SIGNATURES {
            // First match only: one finding per category per request.
            if let Some(pattern) = patterns.iter().find(|p| haystack.contains(*p)) {
                findings.push(
                    SecurityFinding::new(
                        *category,
                        *severity,
                        &ctx.client_ip,
                        format!("Potential {category} attempt detected"),
                    )
                    .detail("detected_pattern", *pattern)
                    .detail("path", &ctx.path)
                    .detail("query_string", raw_query)
                    .detail("method", ctx.method.as_str()),
                );
            }
        }

        self.emit(ctx, findings)
    }

    /// Post-response anomaly checks on status and latency.
    pub fn inspect_response(
        &self,
        ctx: &RequestContext,
        status: StatusCode,
        elapsed: Duration,
    ) -> Vec<SecurityFinding> {
        let mut findings = Vec::new();

        if elapsed > self.slow_threshold {
            findings.push(
                SecurityFinding::new(
                    FindingCategory::SlowRequest,
                    Severity::Medium,
                    &ctx.client_ip,
                    format!("Unusually slow request detected: {:.2}s", elapsed.as_secs_f64()),
                )
                .detail("processing_time_ms", elapsed.as_millis().to_string())
                .detail("status_code", status.as_str())
                .detail("path", &ctx.path),
            );
        }

        match error_signal(status) {
            Some((signal, true)) => {
                findings.push(
                    SecurityFinding::new(
                        FindingCategory::ErrorPattern,
                        Severity::Medium,
                        &ctx.client_ip,
                        format!("Suspicious {signal} from client"),
                    )
                    .detail("error_type", signal)
                    .detail("status_code", status.as_str())
                    .detail("path", &ctx.path)
                    .detail("method", ctx.method.as_str()),
                );
            }
            Some((signal, false)) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    client_ip = %ctx.client_ip,
                    signal,
                    "Probing signal observed"
                );
            }
            None => {}
        }

        self.emit(ctx, findings)
    }

    fn emit(&self, ctx: &RequestContext, findings: Vec<SecurityFinding>) -> Vec<SecurityFinding> {
        findings
            .into_iter()
            .map(|finding| {
                let finding = finding.for_request(&ctx.request_id);
                tracing::warn!(
                    request_id = %ctx.request_id,
                    client_ip = %finding.source_ip,
                    category = %finding.category,
                    severity = ?finding.severity,
                    "{}",
                    finding.description
                );
                metrics::record_finding(finding.category.as_str());
                self.writer.incident(finding.clone());
                finding
            })
            .collect()
    }
}

/// Maps suspicious statuses to a signal name and whether it raises an incident.
fn error_signal(status: StatusCode) -> Option<(&'static str, bool)> {
    match status.as_u16() {
        401 => Some(("unauthorized_access_attempt", true)),
        403 => Some(("forbidden_access_attempt", true)),
        500 => Some(("server_error_trigger", true)),
        404 => Some(("resource_probing", false)),
        405 => Some(("method_probing", false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::writer::StoreJob;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;

    fn monitor() -> (SecurityMonitor, mpsc::Receiver<StoreJob>) {
        let (writer, rx) = StoreWriter::detached(64);
        (SecurityMonitor::new(&SecurityConfig::default(), writer), rx)
    }

    fn ctx(uri: &str, agent: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri(uri).header("x-forwarded-for", "1.2.3.4");
        if let Some(agent) = agent {
            builder = builder.header("user-agent", agent);
        }
        let req = builder.body(Body::empty()).unwrap();
        RequestContext::from_request(&req, "req_test".into(), true)
    }

    fn categories(findings: &[SecurityFinding]) -> Vec<FindingCategory> {
        findings.iter().map(|f| f.category).collect()
    }

    #[test]
    fn test_sql_injection_reported_once() {
        let (monitor, mut rx) = monitor();
        let mut c = ctx("/health", None);
        // Two SQL signatures match; only the first is recorded.
        c.query = Some("id=1' OR '1'='1' UNION SELECT password".into());

        let findings = monitor.inspect_request(&c);
        assert_eq!(categories(&findings), vec![FindingCategory::SqlInjection]);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].source_ip, "1.2.3.4");
        assert_eq!(findings[0].request_id.as_deref(), Some("req_test"));
        assert!(matches!(rx.try_recv(), Ok(StoreJob::Incident(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_percent_encoded_payload_is_decoded() {
        let (monitor, _rx) = monitor();
        let c = ctx("/api/v1/models?q=%3Cscript%3Ealert(1)%3C/script%3E", None);
        assert_eq!(categories(&monitor.inspect_request(&c)), vec![FindingCategory::Xss]);
    }

    #[test]
    fn test_multiple_categories_and_agent() {
        let (monitor, _rx) = monitor();
        let c = ctx("/files/../etc/passwd?cmd=x;%20cat%20/etc/shadow", Some("sqlmap/1.7"));
        let found = categories(&monitor.inspect_request(&c));
        assert_eq!(
            found,
            vec![
                FindingCategory::BlockedAgent,
                FindingCategory::PathTraversal,
                FindingCategory::CommandInjection,
            ]
        );
    }

    #[test]
    fn test_clean_request_has_no_findings() {
        let (monitor, mut rx) = monitor();
        let c = ctx("/api/v1/models?limit=10", Some("Mozilla/5.0"));
        assert!(monitor.inspect_request(&c).is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_response_checks() {
        let (monitor, _rx) = monitor();
        let c = ctx("/api/v1/models", None);

        let slow = monitor.inspect_response(&c, StatusCode::OK, Duration::from_secs(31));
        assert_eq!(categories(&slow), vec![FindingCategory::SlowRequest]);

        let denied = monitor.inspect_response(&c, StatusCode::UNAUTHORIZED, Duration::from_millis(5));
        assert_eq!(categories(&denied), vec![FindingCategory::ErrorPattern]);

        assert!(monitor
            .inspect_response(&c, StatusCode::NOT_FOUND, Duration::from_millis(5))
            .is_empty());
        assert!(monitor
            .inspect_response(&c, StatusCode::METHOD_NOT_ALLOWED, Duration::from_millis(5))
            .is_empty());
        assert!(monitor
            .inspect_response(&c, StatusCode::OK, Duration::from_secs(30))
            .is_empty());
    }
}
