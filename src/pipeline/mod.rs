//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! request
//!     → context.rs (request id, client ip)
//!     → SecurityMonitor::inspect_request
//!     → Authenticator::resolve      (keyed identity, never fails)
//!     → RateLimiter::admit          (ip, then identity)
//!     → Authenticator::enforce      (protected paths)
//!     → RequestAuditor::start
//!     → handler
//!     → RequestAuditor::complete
//!     → SecurityMonitor::inspect_response
//! response (+ X-Request-ID, X-RateLimit-*)
//! ```
//!
//! # Design Decisions
//! - The first rejecting stage ends the chain; the rejection is still audited once
//! - Errors raised inside handlers are re-rendered here so every error body carries the request id
//! - Stages run sequentially inside the request task; shared state lives in the stores

pub mod context;

use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::audit::{target_service, RequestAuditor};
use crate::error::{ErrorClass, GatewayError};
use crate::observability::metrics;
use crate::security::{AuthOutcome, Authenticator, Identity, RateLimiter, SecurityMonitor};

pub use context::RequestContext;

/// What handlers can read about the admitted request.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub identity: Option<Identity>,
}

pub struct AdmissionPipeline {
    monitor: SecurityMonitor,
    limiter: RateLimiter,
    authenticator: Authenticator,
    auditor: RequestAuditor,
    trust_forwarded: bool,
}

impl AdmissionPipeline {
    pub fn new(
        monitor: SecurityMonitor,
        limiter: RateLimiter,
        authenticator: Authenticator,
        auditor: RequestAuditor,
        trust_forwarded: bool,
    ) -> Self {
        Self {
            monitor,
            limiter,
            authenticator,
            auditor,
            trust_forwarded,
        }
    }

    pub async fn run(&self, mut request: Request<Body>, next: Next) -> Response {
        let request_id = RequestAuditor::next_request_id();
        let mut ctx = RequestContext::from_request(&request, request_id, self.trust_forwarded);

        ctx.findings = self.monitor.inspect_request(&ctx);

        let outcome = self.authenticator.resolve(&ctx).await;
        if let AuthOutcome::Authenticated(identity) = &outcome {
            ctx.identity = Some(identity.clone());
        }

        let response = match self.admit(&mut ctx, outcome).await {
            Ok(()) => {
                self.auditor.start(&ctx);
                request.extensions_mut().insert(RequestMeta {
                    request_id: ctx.request_id.clone(),
                    identity: ctx.identity.clone(),
                });
                next.run(request).await
            }
            Err(err) => {
                // Rejected before the audit start ran; log the pair now.
                self.auditor.start(&ctx);
                err.into_response()
            }
        };

        self.finish(&ctx, response)
    }

    async fn admit(&self, ctx: &mut RequestContext, outcome: AuthOutcome) -> Result<(), GatewayError> {
        ctx.rate_limit = self.limiter.admit(ctx).await?;
        ctx.identity = self.authenticator.enforce(ctx, outcome)?;
        Ok(())
    }

    fn finish(&self, ctx: &RequestContext, mut response: Response) -> Response {
        let error = response.extensions_mut().remove::<GatewayError>();
        if let Some(err) = &error {
            if err.class() == ErrorClass::Internal {
                tracing::error!(
                    request_id = %ctx.request_id,
                    path = %ctx.path,
                    error = %err.audit_message(),
                    "Internal fault"
                );
            }
            response = err.render(Some(&ctx.request_id));
        }

        let status = response.status();
        let elapsed = ctx.start.elapsed();
        self.auditor.complete(
            &ctx.request_id,
            status.as_u16(),
            response.body().size_hint().exact(),
            elapsed,
            error.as_ref().map(GatewayError::audit_message),
        );

        self.monitor.inspect_response(ctx, status, elapsed);

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert("x-request-id", value);
        }
        if let Some(decision) = &ctx.rate_limit {
            headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining()));
            headers.insert(
                "x-ratelimit-reset",
                HeaderValue::from(decision.reset_time.timestamp()),
            );
        }

        metrics::record_request(
            ctx.method.as_str(),
            status.as_u16(),
            &target_service(&ctx.path),
            ctx.start,
        );
        response
    }
}

/// Axum middleware entry point.
pub async fn admission(
    State(pipeline): State<Arc<AdmissionPipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    pipeline.run(request, next).await
}
