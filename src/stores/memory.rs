//! Process-local store implementations.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::audit::types::{AuditCompletion, AuditRecord};
use crate::config::ApiKeyConfig;
use crate::security::types::{BucketType, Identity, RateLimitDecision, SecurityFinding};
use crate::stores::{ApiKeyStore, AuditStore, IncidentStore, RateLimitStore, StoreError};

/// API keys provisioned at startup.
#[derive(Debug, Default)]
pub struct InMemoryApiKeyStore {
    keys: DashMap<String, Identity>,
    /// key_id -> last client IP seen.
    last_seen: DashMap<String, String>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(keys: &[ApiKeyConfig]) -> Self {
        let store = Self::new();
        for k in keys {
            store.insert(
                &k.key,
                Identity {
                    key_id: k.key_id.clone(),
                    name: k.name.clone(),
                    permissions: k.permissions.clone(),
                    rate_limit: k.rate_limit,
                    expires_at: k.expires_at,
                },
            );
        }
        store
    }

    pub fn insert(&self, key: &str, identity: Identity) {
        self.keys.insert(key.to_string(), identity);
    }

    pub fn last_seen_ip(&self, key_id: &str) -> Option<String> {
        self.last_seen.get(key_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn validate(
        &self,
        key: &str,
        client_ip: &str,
        _user_agent: Option<&str>,
    ) -> Result<Option<Identity>, StoreError> {
        let Some(identity) = self.keys.get(key).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        if identity.is_expired(Utc::now()) {
            return Ok(None);
        }
        self.last_seen
            .insert(identity.key_id.clone(), client_ip.to_string());
        Ok(Some(identity))
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window counters aligned to wall-clock boundaries.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: DashMap<(BucketType, String), Window>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-increment at an explicit instant.
    ///
    /// The dashmap entry guard holds the shard lock for the whole read-modify-write,
    /// so concurrent callers on the same key are serialized.
    pub fn check_at(
        &self,
        bucket_type: BucketType,
        identifier: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let window_start = window_start(now, window);
        let mut entry = self
            .windows
            .entry((bucket_type, identifier.to_string()))
            .or_insert(Window {
                start: window_start,
                count: 0,
            });

        if entry.start != window_start {
            *entry = Window {
                start: window_start,
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);

        RateLimitDecision::new(bucket_type, identifier, entry.count, limit, entry.start, window)
    }

    pub fn tracked_buckets(&self) -> usize {
        self.windows.len()
    }
}

fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let len = window.as_secs().max(1) as i64;
    let ts = now.timestamp();
    let start = ts - ts.rem_euclid(len);
    Utc.timestamp_opt(start, 0).single().unwrap_or(now)
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check(
        &self,
        bucket_type: BucketType,
        identifier: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, StoreError> {
        Ok(self.check_at(bucket_type, identifier, limit, window, Utc::now()))
    }
}

/// Append-only incident log.
#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    incidents: Mutex<Vec<(String, SecurityFinding)>>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incidents(&self) -> Vec<SecurityFinding> {
        self.incidents
            .lock()
            .expect("incident store mutex poisoned")
            .iter()
            .map(|(_, f)| f.clone())
            .collect()
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn create(&self, finding: &SecurityFinding) -> Result<String, StoreError> {
        let id = format!("inc_{}", Uuid::new_v4().simple());
        self.incidents
            .lock()
            .expect("incident store mutex poisoned")
            .push((id.clone(), finding.clone()));
        Ok(id)
    }
}

/// A request as seen by the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub record: AuditRecord,
    pub completion: Option<AuditCompletion>,
}

/// Audit log keyed by request id.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: DashMap<String, AuditEntry>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, request_id: &str) -> Option<AuditEntry> {
        self.entries.get(request_id).map(|r| r.value().clone())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn start(&self, record: &AuditRecord) -> Result<String, StoreError> {
        self.entries.insert(
            record.request_id.clone(),
            AuditEntry {
                record: record.clone(),
                completion: None,
            },
        );
        Ok(record.request_id.clone())
    }

    async fn complete(&self, completion: &AuditCompletion) -> Result<(), StoreError> {
        match self.entries.get_mut(&completion.request_id) {
            Some(mut entry) => {
                if entry.completion.is_some() {
                    return Err(StoreError::Rejected(format!(
                        "request {} already completed",
                        completion.request_id
                    )));
                }
                entry.completion = Some(completion.clone());
                Ok(())
            }
            None => Err(StoreError::Rejected(format!(
                "no start record for request {}",
                completion.request_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_fixed_window_denies_after_limit_and_resets() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::from_secs(3600);
        let base = 1_700_000_000 - (1_700_000_000 % 3600);

        for i in 1..=5 {
            let d = store.check_at(BucketType::Ip, "1.2.3.4", 5, window, at(base + i));
            assert!(d.allowed, "request {} should pass", i);
            assert_eq!(d.request_count, i as u32);
        }

        let denied = store.check_at(BucketType::Ip, "1.2.3.4", 5, window, at(base + 10));
        assert!(!denied.allowed);
        assert_eq!(denied.request_count, 6);
        assert_eq!(denied.reset_time, at(base + 3600));

        let next = store.check_at(BucketType::Ip, "1.2.3.4", 5, window, denied.reset_time);
        assert!(next.allowed);
        assert_eq!(next.request_count, 1);
        assert_eq!(next.reset_time, at(base + 7200));
    }

    #[test]
    fn test_buckets_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::from_secs(60);
        let now = at(1_700_000_000);

        store.check_at(BucketType::Ip, "k", 1, window, now);
        let ip = store.check_at(BucketType::Ip, "k", 1, window, now);
        let identity = store.check_at(BucketType::Identity, "k", 1, window, now);

        assert!(!ip.allowed);
        assert!(identity.allowed);
        assert_eq!(store.tracked_buckets(), 2);
    }

    #[tokio::test]
    async fn test_api_key_store_rejects_expired_keys() {
        let store = InMemoryApiKeyStore::new();
        let mut identity = Identity {
            key_id: "key_1".into(),
            name: "ci".into(),
            permissions: BTreeSet::new(),
            rate_limit: Some(10),
            expires_at: None,
        };
        store.insert("live", identity.clone());
        identity.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.insert("stale", identity);

        let found = store.validate("live", "10.0.0.1", None).await.unwrap();
        assert_eq!(found.map(|i| i.key_id), Some("key_1".to_string()));
        assert_eq!(store.last_seen_ip("key_1").as_deref(), Some("10.0.0.1"));

        assert!(store.validate("stale", "10.0.0.1", None).await.unwrap().is_none());
        assert!(store.validate("missing", "10.0.0.1", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_store_completes_once() {
        let store = InMemoryAuditStore::new();
        let record = AuditRecord {
            request_id: "req_1".into(),
            method: "GET".into(),
            path: "/health".into(),
            query_params: Default::default(),
            headers: Default::default(),
            client_ip: "127.0.0.1".into(),
            user_agent: None,
            body_size: None,
            target_service: "gateway".into(),
            auth_user: None,
            auth_key_id: None,
            started_at: Utc::now(),
        };
        let completion = AuditCompletion {
            request_id: "req_1".into(),
            status_code: 200,
            response_size: Some(2),
            elapsed_ms: 3,
            error_message: None,
            completed_at: Utc::now(),
        };

        assert_eq!(store.start(&record).await.unwrap(), "req_1");
        store.complete(&completion).await.unwrap();
        assert!(store.complete(&completion).await.is_err());
        assert_eq!(store.get("req_1").unwrap().completion.unwrap().status_code, 200);
    }
}
