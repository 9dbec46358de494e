//! Fixed-window admission control over IP and identity buckets.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::security::types::{
    BucketType, FindingCategory, RateLimitDecision, SecurityFinding, Severity,
};
use crate::stores::{RateLimitStore, StoreError, StoreWriter};

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    writer: StoreWriter,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>, writer: StoreWriter) -> Self {
        Self {
            store,
            writer,
            config,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Exempt paths never touch a bucket.
    pub fn is_exempt(&self, path: &str) -> bool {
        !self.config.enabled || self.config.exempt_paths.contains(path)
    }

    /// Count one request against a bucket. `custom_limit` only applies to identity buckets.
    pub async fn check(
        &self,
        bucket_type: BucketType,
        identifier: &str,
        custom_limit: Option<u32>,
    ) -> Result<RateLimitDecision, StoreError> {
        let limit = match bucket_type {
            BucketType::Ip => self.config.ip_limit,
            BucketType::Identity => custom_limit.unwrap_or(self.config.identity_limit),
        };
        self.store
            .check(bucket_type, identifier, limit, self.window())
            .await
    }

    /// Charge the ip bucket and, when an identity is resolved, the identity bucket.
    ///
    /// Both buckets are counted on every request. The first denial in ip, identity order
    /// is reported. Returns the ip decision for the response headers, or `None` when the
    /// path is exempt or the ip store failed open.
    pub async fn admit(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<RateLimitDecision>, GatewayError> {
        if self.is_exempt(&ctx.path) {
            return Ok(None);
        }

        let ip = self.evaluate(ctx, BucketType::Ip, &ctx.client_ip, None).await;
        let identity = match &ctx.identity {
            Some(identity) => {
                self.evaluate(ctx, BucketType::Identity, &identity.key_id, identity.rate_limit)
                    .await
            }
            None => Ok(None),
        };
        let (ip, identity) = (ip?, identity?);

        for decision in [&ip, &identity].into_iter().flatten() {
            if !decision.allowed {
                self.deny(ctx, decision);
                return Err(GatewayError::rate_limited(decision.clone()));
            }
        }
        Ok(ip)
    }

    /// Count one bucket, applying the store failure policy.
    async fn evaluate(
        &self,
        ctx: &RequestContext,
        bucket_type: BucketType,
        identifier: &str,
        custom_limit: Option<u32>,
    ) -> Result<Option<RateLimitDecision>, GatewayError> {
        match self.check(bucket_type, identifier, custom_limit).await {
            Ok(decision) => Ok(Some(decision)),
            Err(e) if self.config.fail_open => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    bucket = %bucket_type,
                    error = %e,
                    "Rate limit store failed, admitting request"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    bucket = %bucket_type,
                    error = %e,
                    "Rate limit store failed, rejecting request"
                );
                Err(GatewayError::Unavailable(
                    "Rate limiting temporarily unavailable".to_string(),
                ))
            }
        }
    }

    fn deny(&self, ctx: &RequestContext, decision: &RateLimitDecision) {
        let bucket_type = decision.bucket_type;
        let identifier = decision.identifier.as_str();
        tracing::warn!(
            request_id = %ctx.request_id,
            client_ip = %ctx.client_ip,
            bucket = %bucket_type,
            identifier,
            count = decision.request_count,
            limit = decision.limit,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(bucket_type.as_str());
        self.writer.incident(
            SecurityFinding::new(
                FindingCategory::RateLimitExceeded,
                Severity::Medium,
                &ctx.client_ip,
                format!("Rate limit exceeded for {bucket_type} {identifier}"),
            )
            .detail("bucket_type", bucket_type.as_str())
            .detail("identifier", identifier)
            .detail("reason", &decision.reason)
            .detail("path", &ctx.path)
            .for_request(&ctx.request_id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::types::Identity;
    use crate::stores::writer::StoreJob;
    use crate::stores::InMemoryRateLimitStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::BTreeSet;
    use tokio::sync::mpsc;

    struct DownStore;

    #[async_trait]
    impl RateLimitStore for DownStore {
        async fn check(
            &self,
            _bucket_type: BucketType,
            _identifier: &str,
            _limit: u32,
            _window: Duration,
        ) -> Result<RateLimitDecision, StoreError> {
            Err(StoreError::Unavailable("redis gone".into()))
        }
    }

    /// Fails only the ip dimension.
    struct IpDownStore(InMemoryRateLimitStore);

    #[async_trait]
    impl RateLimitStore for IpDownStore {
        async fn check(
            &self,
            bucket_type: BucketType,
            identifier: &str,
            limit: u32,
            window: Duration,
        ) -> Result<RateLimitDecision, StoreError> {
            match bucket_type {
                BucketType::Ip => Err(StoreError::Unavailable("shard down".into())),
                BucketType::Identity => self.0.check(bucket_type, identifier, limit, window).await,
            }
        }
    }

    fn limiter(config: RateLimitConfig) -> (RateLimiter, mpsc::Receiver<StoreJob>) {
        let (writer, rx) = StoreWriter::detached(256);
        (
            RateLimiter::new(config, Arc::new(InMemoryRateLimitStore::new()), writer),
            rx,
        )
    }

    fn ctx(path: &str, ip: &str) -> RequestContext {
        let req = Request::builder()
            .uri(path)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap();
        RequestContext::from_request(&req, "req_rl".into(), true)
    }

    fn identity(limit: Option<u32>) -> Identity {
        Identity {
            key_id: "key-1".into(),
            name: "ci".into(),
            permissions: BTreeSet::new(),
            rate_limit: limit,
            expires_at: None,
        }
    }

    fn incidents(rx: &mut mpsc::Receiver<StoreJob>) -> Vec<SecurityFinding> {
        let mut out = Vec::new();
        while let Ok(job) = rx.try_recv() {
            if let StoreJob::Incident(f) = job {
                out.push(f);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_sixty_first_request_is_denied() {
        let (limiter, mut rx) = limiter(RateLimitConfig::default());
        let c = ctx("/api/v1/models", "1.2.3.4");

        for i in 1..=60 {
            let decision = limiter.admit(&c).await.unwrap().unwrap();
            assert_eq!(decision.request_count, i);
        }

        let err = limiter.admit(&c).await.unwrap_err();
        match err {
            GatewayError::RateLimited { decision, .. } => {
                assert_eq!(decision.bucket_type, BucketType::Ip);
                assert_eq!(decision.remaining(), 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let found = incidents(&mut rx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, FindingCategory::RateLimitExceeded);
        assert_eq!(found[0].severity, Severity::Medium);
        assert_eq!(found[0].source_ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_exempt_path_touches_no_bucket() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let (writer, _rx) = StoreWriter::detached(8);
        let limiter = RateLimiter::new(RateLimitConfig::default(), store.clone(), writer);

        assert!(limiter.admit(&ctx("/health", "1.2.3.4")).await.unwrap().is_none());
        assert_eq!(store.tracked_buckets(), 0);
    }

    #[tokio::test]
    async fn test_custom_limit_applies_to_identity_bucket_only() {
        let (limiter, _rx) = limiter(RateLimitConfig::default());
        let mut c = ctx("/api/v1/models", "5.6.7.8");
        c.identity = Some(identity(Some(2)));

        limiter.admit(&c).await.unwrap();
        let ip = limiter.admit(&c).await.unwrap().unwrap();
        // Surfaced decision is the ip bucket with the default ip limit.
        assert_eq!(ip.bucket_type, BucketType::Ip);
        assert_eq!(ip.limit, 60);

        match limiter.admit(&c).await.unwrap_err() {
            GatewayError::RateLimited { decision, .. } => {
                assert_eq!(decision.bucket_type, BucketType::Identity);
                assert_eq!(decision.limit, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ip_bucket_is_reported_first() {
        let config = RateLimitConfig {
            ip_limit: 1,
            ..RateLimitConfig::default()
        };
        let (limiter, _rx) = limiter(config);
        let mut c = ctx("/api/v1/models", "9.9.9.9");
        c.identity = Some(identity(Some(1)));

        limiter.admit(&c).await.unwrap();
        match limiter.admit(&c).await.unwrap_err() {
            GatewayError::RateLimited { decision, .. } => {
                assert_eq!(decision.bucket_type, BucketType::Ip)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_failure_policy() {
        let (writer, _rx) = StoreWriter::detached(8);
        let open = RateLimiter::new(RateLimitConfig::default(), Arc::new(DownStore), writer.clone());
        assert!(open.admit(&ctx("/api/x", "1.1.1.1")).await.unwrap().is_none());

        let closed = RateLimiter::new(
            RateLimitConfig {
                fail_open: false,
                ..RateLimitConfig::default()
            },
            Arc::new(DownStore),
            writer,
        );
        assert!(matches!(
            closed.admit(&ctx("/api/x", "1.1.1.1")).await,
            Err(GatewayError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_identity_bucket_charged_while_ip_denied() {
        let config = RateLimitConfig {
            ip_limit: 1,
            ..RateLimitConfig::default()
        };
        let (limiter, mut rx) = limiter(config);
        let mut c = ctx("/api/v1/models", "9.9.9.8");
        c.identity = Some(identity(Some(10)));

        limiter.admit(&c).await.unwrap();
        assert!(limiter.admit(&c).await.is_err());
        assert!(limiter.admit(&c).await.is_err());

        // Three admits so far, this check is the fourth.
        let next = limiter.check(BucketType::Identity, "key-1", Some(10)).await.unwrap();
        assert_eq!(next.request_count, 4);

        // One incident per denied request, never one per bucket.
        assert_eq!(incidents(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_ip_store_failure_keeps_identity_limit() {
        let (writer, _rx) = StoreWriter::detached(8);
        let limiter = RateLimiter::new(
            RateLimitConfig::default(),
            Arc::new(IpDownStore(InMemoryRateLimitStore::new())),
            writer,
        );
        let mut c = ctx("/api/v1/models", "7.7.7.7");
        c.identity = Some(identity(Some(1)));

        assert!(limiter.admit(&c).await.unwrap().is_none());
        match limiter.admit(&c).await.unwrap_err() {
            GatewayError::RateLimited { decision, .. } => {
                assert_eq!(decision.bucket_type, BucketType::Identity)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
