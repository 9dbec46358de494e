//! Caller authentication.
//!
//! Split in two phases so the rate limiter can see the caller before access is enforced:
//! [`Authenticator::resolve`] never fails, [`Authenticator::enforce`] applies the path policy.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::{AuthConfig, AuthMode, UnclassifiedPolicy};
use crate::error::GatewayError;
use crate::pipeline::context::RequestContext;
use crate::security::types::Identity;
use crate::stores::ApiKeyStore;

const MISSING_HEADER: &str = "Not authenticated. Authorization header is missing.";
const MISSING_KEY: &str = "API key required";
const WRONG_SCHEME: &str = "Invalid authentication scheme. Use Bearer token.";
const MALFORMED: &str = "Malformed Authorization header. Expected 'Bearer <token>'.";
const INVALID_KEY: &str = "Invalid API key.";

/// Active authentication mode, selected once at startup.
#[derive(Clone)]
pub enum AuthPolicy {
    /// Every request passes with no identity.
    Open,
    /// One static bearer token, compared exactly.
    SharedSecret(String),
    /// Credentials validated against an external key store.
    Keyed(Arc<dyn ApiKeyStore>),
}

impl AuthPolicy {
    pub fn from_config(config: &AuthConfig, keys: Arc<dyn ApiKeyStore>) -> Self {
        match config.mode {
            AuthMode::Open => AuthPolicy::Open,
            AuthMode::SharedSecret => match config.shared_secret.as_deref().map(str::trim) {
                Some(secret) if !secret.is_empty() => AuthPolicy::SharedSecret(secret.to_string()),
                _ => {
                    tracing::warn!("Shared secret mode without a secret, gateway is open");
                    AuthPolicy::Open
                }
            },
            AuthMode::Keyed => AuthPolicy::Keyed(keys),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthPolicy::Open => "open",
            AuthPolicy::SharedSecret(_) => "shared_secret",
            AuthPolicy::Keyed(_) => "keyed",
        }
    }
}

impl fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    Protected,
}

/// Result of the non-failing resolve phase.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// No credential required or none offered under the open policy.
    Anonymous,
    /// Credential validated against the key store.
    Authenticated(Identity),
    /// Holder of the shared secret. Carries no per-key identity to rate limit.
    SecretHolder,
    /// Credential missing or bad; only fatal on protected paths.
    Rejected(GatewayError),
}

/// Credential found on the request.
#[derive(Debug, PartialEq, Eq)]
enum Credential {
    Token(String),
    Missing,
    Malformed,
    WrongScheme,
}

pub struct Authenticator {
    policy: AuthPolicy,
    public_paths: BTreeSet<String>,
    protected_prefixes: Vec<String>,
    unclassified: UnclassifiedPolicy,
}

impl Authenticator {
    pub fn new(policy: AuthPolicy, config: &AuthConfig) -> Self {
        Self {
            policy,
            public_paths: config.public_paths.clone(),
            protected_prefixes: config.protected_prefixes.clone(),
            unclassified: config.unclassified,
        }
    }

    pub fn classify(&self, path: &str) -> PathClass {
        if self.public_paths.contains(path) {
            PathClass::Public
        } else if self.protected_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            PathClass::Protected
        } else {
            match self.unclassified {
                UnclassifiedPolicy::Protected => PathClass::Protected,
                UnclassifiedPolicy::Public => PathClass::Public,
            }
        }
    }

    pub async fn resolve(&self, ctx: &RequestContext) -> AuthOutcome {
        match &self.policy {
            AuthPolicy::Open => AuthOutcome::Anonymous,
            AuthPolicy::SharedSecret(secret) => match bearer_credential(ctx) {
                Credential::Token(token) if token == *secret => AuthOutcome::SecretHolder,
                Credential::Token(_) => reject(INVALID_KEY),
                Credential::Missing => reject(MISSING_HEADER),
                Credential::Malformed => reject(MALFORMED),
                Credential::WrongScheme => reject(WRONG_SCHEME),
            },
            AuthPolicy::Keyed(store) => {
                let token = match any_credential(ctx) {
                    Credential::Token(token) => token,
                    Credential::Malformed => return reject(MALFORMED),
                    Credential::WrongScheme | Credential::Missing => return reject(MISSING_KEY),
                };
                match store
                    .validate(&token, &ctx.client_ip, ctx.user_agent.as_deref())
                    .await
                {
                    Ok(Some(identity)) => {
                        tracing::debug!(
                            request_id = %ctx.request_id,
                            key_id = %identity.key_id,
                            "API key accepted"
                        );
                        AuthOutcome::Authenticated(identity)
                    }
                    Ok(None) => {
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            client_ip = %ctx.client_ip,
                            key_prefix = %key_prefix(&token),
                            "Invalid API key"
                        );
                        reject(INVALID_KEY)
                    }
                    Err(e) => {
                        tracing::error!(
                            request_id = %ctx.request_id,
                            error = %e,
                            "API key store failed"
                        );
                        AuthOutcome::Rejected(GatewayError::Unavailable(
                            "Authentication service unavailable".to_string(),
                        ))
                    }
                }
            }
        }
    }

    /// Apply the path policy to a resolved outcome.
    pub fn enforce(
        &self,
        ctx: &RequestContext,
        outcome: AuthOutcome,
    ) -> Result<Option<Identity>, GatewayError> {
        match (outcome, self.classify(&ctx.path)) {
            (AuthOutcome::Authenticated(identity), _) => Ok(Some(identity)),
            (AuthOutcome::SecretHolder, _) => Ok(Some(Identity::shared_secret())),
            (AuthOutcome::Anonymous, _) | (AuthOutcome::Rejected(_), PathClass::Public) => Ok(None),
            (AuthOutcome::Rejected(err), PathClass::Protected) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    client_ip = %ctx.client_ip,
                    path = %ctx.path,
                    reason = %err,
                    "Authentication failed"
                );
                Err(err)
            }
        }
    }

    /// Both phases back to back.
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<Identity>, GatewayError> {
        let outcome = self.resolve(ctx).await;
        self.enforce(ctx, outcome)
    }
}

fn reject(message: &str) -> AuthOutcome {
    AuthOutcome::Rejected(GatewayError::Unauthorized(message.to_string()))
}

/// Splits `Authorization` into scheme and token.
fn parse_authorization(value: &str) -> Option<(&str, &str)> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) => Some((scheme, token)),
        _ => None,
    }
}

fn bearer_credential(ctx: &RequestContext) -> Credential {
    let Some(value) = ctx.header("authorization") else {
        return Credential::Missing;
    };
    match parse_authorization(value) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Credential::Token(token.to_string())
        }
        Some(_) => Credential::WrongScheme,
        None => Credential::Malformed,
    }
}

/// Bearer, then ApiKey scheme, then `X-API-Key`, then the `api_key` query parameter.
fn any_credential(ctx: &RequestContext) -> Credential {
    if let Some(value) = ctx.header("authorization") {
        match parse_authorization(value) {
            Some((scheme, token))
                if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("apikey") =>
            {
                return Credential::Token(token.to_string());
            }
            Some(_) => {}
            None => return Credential::Malformed,
        }
    }
    if let Some(key) = ctx.header("x-api-key").filter(|k| !k.is_empty()) {
        return Credential::Token(key.to_string());
    }
    match ctx.query_param("api_key").filter(|k| !k.is_empty()) {
        Some(key) => Credential::Token(key),
        None => Credential::Missing,
    }
}

fn key_prefix(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryApiKeyStore, StoreError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    struct DownKeys;

    #[async_trait]
    impl ApiKeyStore for DownKeys {
        async fn validate(
            &self,
            _key: &str,
            _client_ip: &str,
            _user_agent: Option<&str>,
        ) -> Result<Option<Identity>, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
    }

    fn ctx(uri: &str, headers: &[(&str, &str)]) -> RequestContext {
        let mut builder = Request::builder().uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let req = builder.body(Body::empty()).unwrap();
        RequestContext::from_request(&req, "req_auth".into(), true)
    }

    fn keyed() -> Authenticator {
        let store = InMemoryApiKeyStore::new();
        store.insert(
            "sk-live-123",
            Identity {
                key_id: "key-1".into(),
                name: "ci".into(),
                permissions: BTreeSet::from(["read".to_string()]),
                rate_limit: Some(10),
                expires_at: None,
            },
        );
        Authenticator::new(AuthPolicy::Keyed(Arc::new(store)), &AuthConfig::default())
    }

    fn shared(secret: &str) -> Authenticator {
        Authenticator::new(AuthPolicy::SharedSecret(secret.into()), &AuthConfig::default())
    }

    fn message(result: Result<Option<Identity>, GatewayError>) -> String {
        match result {
            Err(GatewayError::Unauthorized(msg)) => msg,
            other => panic!("expected 401, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_secret_collapses_to_open() {
        let config = AuthConfig {
            mode: AuthMode::SharedSecret,
            shared_secret: Some("  ".into()),
            ..AuthConfig::default()
        };
        let policy = AuthPolicy::from_config(&config, Arc::new(InMemoryApiKeyStore::new()));
        assert!(matches!(policy, AuthPolicy::Open));
    }

    #[tokio::test]
    async fn test_open_gateway_allows_everything() {
        let auth = Authenticator::new(AuthPolicy::Open, &AuthConfig::default());
        for path in ["/api/v1/models", "/admin/keys", "/anything", "/health"] {
            let c = ctx(path, &[("authorization", "Bearer whatever")]);
            assert_eq!(auth.authenticate(&c).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_shared_secret_messages() {
        let auth = shared("s3cret");

        let ok = auth
            .authenticate(&ctx("/api/v1/models", &[("authorization", "Bearer s3cret")]))
            .await
            .unwrap();
        assert_eq!(ok, Some(Identity::shared_secret()));

        let resolved = auth
            .resolve(&ctx("/api/v1/models", &[("authorization", "Bearer s3cret")]))
            .await;
        assert!(matches!(resolved, AuthOutcome::SecretHolder));

        let cases = [
            (vec![], MISSING_HEADER),
            (vec![("authorization", "Bearer wrong-token")], INVALID_KEY),
            (vec![("authorization", "Basic czNjcmV0")], WRONG_SCHEME),
            (vec![("authorization", "s3cret")], MALFORMED),
        ];
        for (headers, expected) in cases {
            let c = ctx("/api/v1/models", &headers);
            assert_eq!(message(auth.authenticate(&c).await), expected);
        }
    }

    #[tokio::test]
    async fn test_public_path_ignores_bad_credentials() {
        let auth = shared("s3cret");
        let c = ctx("/health", &[("authorization", "Bearer wrong-token")]);
        assert_eq!(auth.authenticate(&c).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keyed_credential_precedence() {
        let auth = keyed();

        let via_query = ctx("/api/v1/models?api_key=sk-live-123", &[]);
        assert_eq!(auth.authenticate(&via_query).await.unwrap().unwrap().key_id, "key-1");

        let via_header = ctx("/api/v1/models", &[("x-api-key", "sk-live-123")]);
        assert!(auth.authenticate(&via_header).await.unwrap().is_some());

        let apikey_scheme = ctx("/api/v1/models", &[("authorization", "ApiKey sk-live-123")]);
        assert!(auth.authenticate(&apikey_scheme).await.unwrap().is_some());

        // Bearer wins over a valid X-API-Key.
        let both = ctx(
            "/api/v1/models",
            &[("authorization", "Bearer nope"), ("x-api-key", "sk-live-123")],
        );
        assert_eq!(message(auth.authenticate(&both).await), INVALID_KEY);

        // Unsupported scheme falls through to the next source.
        let basic = ctx(
            "/api/v1/models",
            &[("authorization", "Basic abc"), ("x-api-key", "sk-live-123")],
        );
        assert!(auth.authenticate(&basic).await.unwrap().is_some());

        let malformed = ctx("/api/v1/models?api_key=sk-live-123", &[("authorization", "garbage")]);
        assert_eq!(message(auth.authenticate(&malformed).await), MALFORMED);

        assert_eq!(message(auth.authenticate(&ctx("/api/v1/models", &[])).await), MISSING_KEY);
    }

    #[tokio::test]
    async fn test_key_store_failure_is_fail_closed() {
        let auth = Authenticator::new(AuthPolicy::Keyed(Arc::new(DownKeys)), &AuthConfig::default());
        let c = ctx("/api/v1/models", &[("x-api-key", "sk-live-123")]);
        let err = auth.authenticate(&c).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_path_classification() {
        let auth = keyed();
        assert_eq!(auth.classify("/health"), PathClass::Public);
        assert_eq!(auth.classify("/api/system/health"), PathClass::Public);
        assert_eq!(auth.classify("/api/system/status"), PathClass::Protected);
        assert_eq!(auth.classify("/somewhere"), PathClass::Protected);

        let config = AuthConfig {
            unclassified: UnclassifiedPolicy::Public,
            ..AuthConfig::default()
        };
        let lenient = Authenticator::new(AuthPolicy::Open, &config);
        assert_eq!(lenient.classify("/somewhere"), PathClass::Public);
    }
}
