//! Time-limited cache of computed metric values
//!
//! A cache failure never fails a metric: implementations log and behave as
//! a miss instead.

use chrono::{NaiveDate, Utc};
use moka::sync::Cache;
use moka::Expiry;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::CacheConfig;
use crate::storage::MetricsDb;

/// Identity of a cached computation: metric name plus reference day
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub metric: String,
    pub reference: NaiveDate,
}

impl MetricKey {
    pub fn new(metric: impl Into<String>, reference: NaiveDate) -> Self {
        Self {
            metric: metric.into(),
            reference,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.metric, self.reference.format("%Y-%m-%d"))
    }
}

pub trait MetricCache: Send + Sync {
    fn get(&self, key: &MetricKey) -> Option<f64>;

    /// Store `value`, replacing any previous entry; it stops being visible
    /// once `ttl` has elapsed.
    fn put(&self, key: &MetricKey, value: f64, ttl: Duration);
}

#[derive(Debug, Clone, Copy)]
struct CachedValue {
    value: f64,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<MetricKey, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &MetricKey,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &MetricKey,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache for long-lived embedders
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<MetricKey, CachedValue>,
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }

    /// Sized by `[cache] max_entries`
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries)
    }
}

impl MetricCache for MemoryCache {
    fn get(&self, key: &MetricKey) -> Option<f64> {
        self.inner.get(key).map(|cached| cached.value)
    }

    fn put(&self, key: &MetricKey, value: f64, ttl: Duration) {
        self.inner.insert(key.clone(), CachedValue { value, ttl });
    }
}

/// Cache persisted in the metrics database so values outlive one CLI run
#[derive(Clone)]
pub struct SqliteCache {
    db: Arc<MetricsDb>,
}

impl SqliteCache {
    pub fn new(db: Arc<MetricsDb>) -> Self {
        Self { db }
    }
}

impl MetricCache for SqliteCache {
    fn get(&self, key: &MetricKey) -> Option<f64> {
        let now = Utc::now().timestamp_millis();
        match self.db.cached_value(&key.to_string(), now) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn put(&self, key: &MetricKey, value: f64, ttl: Duration) {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        if let Err(e) = self.db.store_value(&key.to_string(), value, expires_at) {
            warn!(key = %key, error = %e, "cache write failed");
        }
    }
}

/// Always misses; used when caching is switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl MetricCache for NoCache {
    fn get(&self, _key: &MetricKey) -> Option<f64> {
        None
    }

    fn put(&self, _key: &MetricKey, _value: f64, _ttl: Duration) {}
}
