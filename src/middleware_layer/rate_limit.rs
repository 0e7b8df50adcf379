use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tokio::sync::Mutex;

use crate::{
    crypto::session::now_ms,
    error::{AppError, Result},
    state::AppState,
};

/// Buckets kept for failed logins before eviction kicks in.
pub const LOGIN_BUCKET_CAP: usize = 100;
/// Buckets kept for write actions before eviction kicks in.
pub const ACTION_BUCKET_CAP: usize = 2000;
/// Failed logins allowed per window.
pub const MAX_LOGIN_ATTEMPTS: u32 = 10;
pub const LOGIN_WINDOW_MS: i64 = 15 * 60 * 1000;

/// A fixed-window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub count: u32,
    pub reset_at: i64,
}

impl Bucket {
    fn is_live(&self, now_ms: i64) -> bool {
        self.reset_at > now_ms
    }
}

/// Keyed storage for rate-limit buckets.
#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bucket>>;
    async fn set(&self, key: &str, bucket: Bucket, now_ms: i64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Drops expired buckets and enforces any size cap.
    async fn prune(&self, now_ms: i64) -> Result<()>;
}

/// In-process bucket map with a hard cap on its size.
pub struct MemoryBucketStore {
    buckets: Mutex<HashMap<String, Bucket>>,
    cap: usize,
}

impl MemoryBucketStore {
    pub fn new(cap: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            cap,
        }
    }

    pub async fn len(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn get(&self, key: &str) -> Result<Option<Bucket>> {
        Ok(self.buckets.lock().await.get(key).copied())
    }

    async fn set(&self, key: &str, bucket: Bucket, _now_ms: i64) -> Result<()> {
        self.buckets.lock().await.insert(key.to_string(), bucket);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.buckets.lock().await.remove(key);
        Ok(())
    }

    async fn prune(&self, now_ms: i64) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        buckets.retain(|_, bucket| bucket.is_live(now_ms));
        if buckets.len() <= self.cap {
            return Ok(());
        }

        let mut by_reset: Vec<(String, i64)> = buckets
            .iter()
            .map(|(key, bucket)| (key.clone(), bucket.reset_at))
            .collect();
        by_reset.sort_by_key(|(_, reset_at)| *reset_at);

        let excess = buckets.len() - self.cap;
        for (key, _) in by_reset.into_iter().take(excess) {
            buckets.remove(&key);
        }
        tracing::debug!("Evicted {} rate-limit buckets", excess);
        Ok(())
    }
}

/// Buckets shared through Redis, expiring with the window.
#[derive(Clone)]
pub struct RedisBucketStore {
    redis: ConnectionManager,
    prefix: &'static str,
}

impl RedisBucketStore {
    pub fn new(redis: ConnectionManager, prefix: &'static str) -> Self {
        Self { redis, prefix }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn get(&self, key: &str) -> Result<Option<Bucket>> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(raw.and_then(|json| sonic_rs::from_str(&json).ok()))
    }

    async fn set(&self, key: &str, bucket: Bucket, now_ms: i64) -> Result<()> {
        let json = sonic_rs::to_string(&bucket)
            .map_err(|e| AppError::Internal(format!("Bucket serialization failed: {}", e)))?;
        let ttl_ms = (bucket.reset_at - now_ms).max(1);
        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(json)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _: () = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(())
    }

    async fn prune(&self, _now_ms: i64) -> Result<()> {
        Ok(())
    }
}

/// Limit and window for one throttled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub limit: u32,
    pub window_ms: i64,
}

impl RatePolicy {
    pub const fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window_ms: 60 * 1000,
        }
    }

    pub const fn per_ten_minutes(limit: u32) -> Self {
        Self {
            limit,
            window_ms: 10 * 60 * 1000,
        }
    }
}

pub const ENTRY_CREATE: RatePolicy = RatePolicy::per_minute(30);
pub const ENTRY_UPDATE: RatePolicy = RatePolicy::per_minute(40);
pub const ENTRY_DELETE: RatePolicy = RatePolicy::per_minute(30);
pub const SETTINGS_UPDATE: RatePolicy = RatePolicy::per_minute(10);
pub const SNAPSHOTS_WRITE: RatePolicy = RatePolicy::per_minute(30);
pub const HOLDINGS_WRITE: RatePolicy = RatePolicy::per_minute(30);
pub const BACKUP_EXPORT: RatePolicy = RatePolicy::per_ten_minutes(10);
pub const BACKUP_RESTORE: RatePolicy = RatePolicy::per_ten_minutes(3);

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: i64,
    /// Seconds until the window resets, only when denied.
    pub retry_after: Option<u64>,
}

/// Fixed-window limiter keyed by `action:ip`.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    lock: Arc<Mutex<()>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBucketStore::new(ACTION_BUCKET_CAP)))
    }

    pub async fn check_at(
        &self,
        action: &str,
        ip: &str,
        policy: RatePolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision> {
        let _guard = self.lock.lock().await;
        self.store.prune(now_ms).await?;

        let key = format!("{}:{}", action, ip);
        let existing = self
            .store
            .get(&key)
            .await?
            .filter(|bucket| bucket.is_live(now_ms));

        let Some(mut bucket) = existing else {
            let bucket = Bucket {
                count: 1,
                reset_at: now_ms + policy.window_ms,
            };
            self.store.set(&key, bucket, now_ms).await?;
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: policy.limit.saturating_sub(1),
                reset_at: bucket.reset_at,
                retry_after: None,
            });
        };

        if bucket.count >= policy.limit {
            let wait_ms = (bucket.reset_at - now_ms).max(0) as u64;
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: bucket.reset_at,
                retry_after: Some(wait_ms.div_ceil(1000)),
            });
        }

        bucket.count += 1;
        self.store.set(&key, bucket, now_ms).await?;
        Ok(RateLimitDecision {
            allowed: true,
            remaining: policy.limit.saturating_sub(bucket.count),
            reset_at: bucket.reset_at,
            retry_after: None,
        })
    }

    pub async fn check(&self, action: &str, ip: &str, policy: RatePolicy) -> Result<RateLimitDecision> {
        self.check_at(action, ip, policy, now_ms()).await
    }

    /// Fails with `RateLimited` when `action` is exhausted for `ip`.
    ///
    /// Store failures are logged and let the request through.
    pub async fn enforce(&self, action: &str, ip: &str, policy: RatePolicy) -> Result<()> {
        match self.check(action, ip, policy).await {
            Ok(decision) if decision.allowed => Ok(()),
            Ok(decision) => {
                tracing::warn!("Rate limit hit for {} from {}", action, ip);
                Err(AppError::RateLimited {
                    message: "Too many requests. Try again shortly.".to_string(),
                    retry_after: decision.retry_after.unwrap_or(1),
                })
            }
            Err(e) => {
                tracing::error!("Rate limit store unavailable for {}: {}", action, e);
                Ok(())
            }
        }
    }
}

/// Counts failed logins per client IP.
#[derive(Clone)]
pub struct LoginLimiter {
    store: Arc<dyn BucketStore>,
    lock: Arc<Mutex<()>>,
    max_attempts: u32,
    window_ms: i64,
}

impl LoginLimiter {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
            max_attempts: MAX_LOGIN_ATTEMPTS,
            window_ms: LOGIN_WINDOW_MS,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBucketStore::new(LOGIN_BUCKET_CAP)))
    }

    fn key(ip: &str) -> String {
        format!("login:{}", ip)
    }

    pub async fn is_limited_at(&self, ip: &str, now_ms: i64) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let key = Self::key(ip);
        match self.store.get(&key).await? {
            Some(bucket) if bucket.is_live(now_ms) => Ok(bucket.count >= self.max_attempts),
            Some(_) => {
                self.store.delete(&key).await?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    pub async fn register_failure_at(&self, ip: &str, now_ms: i64) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.prune(now_ms).await?;

        let key = Self::key(ip);
        let bucket = match self.store.get(&key).await? {
            Some(bucket) if bucket.is_live(now_ms) => Bucket {
                count: bucket.count.saturating_add(1),
                reset_at: bucket.reset_at,
            },
            _ => Bucket {
                count: 1,
                reset_at: now_ms + self.window_ms,
            },
        };
        self.store.set(&key, bucket, now_ms).await
    }

    pub async fn clear(&self, ip: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.delete(&Self::key(ip)).await
    }

    pub async fn is_limited(&self, ip: &str) -> Result<bool> {
        self.is_limited_at(ip, now_ms()).await
    }

    pub async fn register_failure(&self, ip: &str) -> Result<()> {
        self.register_failure_at(ip, now_ms()).await
    }
}

/// The caller's address as used for rate-limit keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

fn valid_ip(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.len() > 45 {
        return None;
    }
    candidate.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

/// Resolves the client IP, consulting forwarding headers only when trusted.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(valid_ip);
        let real = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(valid_ip)
        };
        if let Some(ip) = forwarded.or_else(real) {
            return ip;
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(resolve_client_ip(
            &parts.headers,
            peer,
            state.config.trust_proxy,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const NOW: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn denies_after_limit_then_resets_with_window() {
        let limiter = RateLimiter::in_memory();
        let policy = RatePolicy { limit: 3, window_ms: 1000 };

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("journal:create", "1.2.3.4", policy, NOW).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check_at("journal:create", "1.2.3.4", policy, NOW + 1).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(1));
        assert_eq!(denied.reset_at, NOW + 1000);

        let fresh = limiter.check_at("journal:create", "1.2.3.4", policy, NOW + 1000).await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.reset_at, NOW + 2000);
    }

    #[tokio::test]
    async fn keys_are_scoped_by_action_and_ip() {
        let limiter = RateLimiter::in_memory();
        let policy = RatePolicy { limit: 1, window_ms: 60_000 };

        assert!(limiter.check_at("a", "ip1", policy, NOW).await.unwrap().allowed);
        assert!(!limiter.check_at("a", "ip1", policy, NOW).await.unwrap().allowed);
        assert!(limiter.check_at("b", "ip1", policy, NOW).await.unwrap().allowed);
        assert!(limiter.check_at("a", "ip2", policy, NOW).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn retry_after_rounds_up() {
        let limiter = RateLimiter::in_memory();
        let policy = RatePolicy { limit: 1, window_ms: 60_000 };
        limiter.check_at("x", "ip", policy, NOW).await.unwrap();
        let denied = limiter.check_at("x", "ip", policy, NOW + 500).await.unwrap();
        assert_eq!(denied.retry_after, Some(60));
    }

    #[tokio::test]
    async fn enforce_maps_denial_to_error() {
        let limiter = RateLimiter::in_memory();
        let policy = RatePolicy { limit: 1, window_ms: 60_000 };
        limiter.enforce("settings:update", "ip", policy).await.unwrap();
        let err = limiter.enforce("settings:update", "ip", policy).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after, .. } if retry_after >= 1));
    }

    #[tokio::test]
    async fn memory_store_evicts_expired_then_oldest() {
        let store = MemoryBucketStore::new(2);
        store.set("expired", Bucket { count: 1, reset_at: NOW - 1 }, NOW).await.unwrap();
        store.set("old", Bucket { count: 1, reset_at: NOW + 10 }, NOW).await.unwrap();
        store.set("mid", Bucket { count: 1, reset_at: NOW + 20 }, NOW).await.unwrap();
        store.set("new", Bucket { count: 1, reset_at: NOW + 30 }, NOW).await.unwrap();

        store.prune(NOW).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("mid").await.unwrap().is_some());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn login_limiter_blocks_after_max_failures() {
        let limiter = LoginLimiter::in_memory();
        for _ in 0..MAX_LOGIN_ATTEMPTS - 1 {
            limiter.register_failure_at("9.9.9.9", NOW).await.unwrap();
        }
        assert!(!limiter.is_limited_at("9.9.9.9", NOW).await.unwrap());

        limiter.register_failure_at("9.9.9.9", NOW).await.unwrap();
        assert!(limiter.is_limited_at("9.9.9.9", NOW).await.unwrap());
        assert!(!limiter.is_limited_at("8.8.8.8", NOW).await.unwrap());

        assert!(!limiter.is_limited_at("9.9.9.9", NOW + LOGIN_WINDOW_MS).await.unwrap());
    }

    #[tokio::test]
    async fn login_limiter_clears_on_success() {
        let limiter = LoginLimiter::in_memory();
        for _ in 0..MAX_LOGIN_ATTEMPTS {
            limiter.register_failure_at("ip", NOW).await.unwrap();
        }
        limiter.clear("ip").await.unwrap();
        assert!(!limiter.is_limited_at("ip", NOW).await.unwrap());
    }

    #[test]
    fn forwarded_headers_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();

        assert_eq!(resolve_client_ip(&headers, Some(peer), false), "127.0.0.1");
        assert_eq!(resolve_client_ip(&headers, Some(peer), true), "203.0.113.9");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn malformed_forwarded_values_fall_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("010.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(resolve_client_ip(&headers, None, true), "2001:db8::1");

        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(resolve_client_ip(&headers, None, true), "unknown");
    }
}
