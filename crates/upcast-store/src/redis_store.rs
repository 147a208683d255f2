//! Redis store backends.
//!
//! Quota counters and analysis cache entries are the two pieces of state
//! shared by scheduler workers running in different processes, so they get
//! Redis implementations. The increment-if-below-limit primitive runs as a
//! Lua script, which Redis executes atomically; racing workers therefore
//! serialize on the store, not on any in-process lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::AsyncCommands;
use tracing::{debug, warn};

use upcast_models::{AnalysisCacheEntry, AnalysisResult};

use crate::error::StoreResult;
use crate::traits::{AnalysisCache, QuotaLedger};

/// Counters outlive their day by a margin, then expire with the key.
const COUNTER_TTL_SECS: u64 = 48 * 60 * 60;

/// Reserve one admission slot if the counter is below the limit.
///
/// Runs atomically inside Redis; returns 1 on success, 0 when full.
const RESERVE_LUA: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return 0
end
local new = redis.call('INCR', KEYS[1])
if new == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return 1
"#;

/// Decrement a counter without going below zero.
const RELEASE_LUA: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current > 0 then
    redis.call('DECR', KEYS[1])
end
return 0
"#;

/// Redis backend configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key written by this deployment
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "upcast".to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("UPCAST_KEY_PREFIX")
                .unwrap_or_else(|_| "upcast".to_string()),
        }
    }
}

/// Quota ledger backed by Redis counters.
pub struct RedisQuotaLedger {
    client: redis::Client,
    prefix: String,
    reserve_script: redis::Script,
    release_script: redis::Script,
}

impl RedisQuotaLedger {
    /// Create a new ledger client.
    pub fn new(config: &RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            prefix: config.key_prefix.clone(),
            reserve_script: redis::Script::new(RESERVE_LUA),
            release_script: redis::Script::new(RELEASE_LUA),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(&RedisStoreConfig::from_env())
    }

    fn counter_key(&self, channel_id: &str, day: NaiveDate) -> String {
        format!("{}:quota:{}:{}", self.prefix, channel_id, day.format("%Y-%m-%d"))
    }
}

/// Collect every key matching `pattern` with a cursor SCAN.
async fn scan_keys(
    conn: &mut redis::aio::MultiplexedConnection,
    pattern: &str,
) -> StoreResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;

    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(conn)
            .await?;
        keys.extend(batch);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }

    Ok(keys)
}

#[async_trait]
impl QuotaLedger for RedisQuotaLedger {
    async fn try_reserve(&self, channel_id: &str, day: NaiveDate, limit: u32) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let granted: i64 = self
            .reserve_script
            .key(self.counter_key(channel_id, day))
            .arg(limit)
            .arg(COUNTER_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;

        Ok(granted == 1)
    }

    async fn release(&self, channel_id: &str, day: NaiveDate) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        self.release_script
            .key(self.counter_key(channel_id, day))
            .invoke_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn used(&self, channel_id: &str, day: NaiveDate) -> StoreResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let count: Option<u32> = conn.get(self.counter_key(channel_id, day)).await?;
        Ok(count.unwrap_or(0))
    }

    async fn usage(&self, day: NaiveDate) -> StoreResult<std::collections::HashMap<String, u32>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let day_str = day.format("%Y-%m-%d").to_string();
        let pattern = format!("{}:quota:*:{}", self.prefix, day_str);
        let keys = scan_keys(&mut conn, &pattern).await?;

        let mut usage = std::collections::HashMap::new();
        let head = format!("{}:quota:", self.prefix);
        let tail = format!(":{}", day_str);
        for key in keys {
            let count: Option<u32> = conn.get(&key).await?;
            let channel_id = key
                .strip_prefix(head.as_str())
                .and_then(|rest| rest.strip_suffix(tail.as_str()));
            if let (Some(channel_id), Some(count)) = (channel_id, count) {
                usage.insert(channel_id.to_string(), count);
            }
        }

        Ok(usage)
    }
}

/// Analysis cache backed by Redis values with server-side expiry.
///
/// Every entry also carries its own `expires_at`, double-checked at lookup
/// time; store unavailability degrades to a miss per the cache contract.
pub struct RedisAnalysisCache {
    client: redis::Client,
    prefix: String,
}

impl RedisAnalysisCache {
    /// Create a new cache client.
    pub fn new(config: &RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            prefix: config.key_prefix.clone(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(&RedisStoreConfig::from_env())
    }

    fn cache_key(&self, content_hash: &str) -> String {
        format!("{}:analysis:{}", self.prefix, content_hash)
    }
}

#[async_trait]
impl AnalysisCache for RedisAnalysisCache {
    async fn lookup(&self, content_hash: &str) -> Option<AnalysisResult> {
        let key = self.cache_key(content_hash);

        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Analysis cache unavailable, treating as miss");
                return None;
            }
        };

        let payload: Option<String> = match conn.get(&key).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Analysis cache read failed, treating as miss");
                return None;
            }
        };

        let entry: AnalysisCacheEntry = match payload.as_deref().map(serde_json::from_str) {
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Corrupt analysis cache entry, treating as miss");
                return None;
            }
            None => return None,
        };

        if entry.is_expired() {
            debug!(key = %key, "Analysis cache entry expired");
            let _: Result<(), _> = conn.del(&key).await;
            return None;
        }

        debug!(key = %key, "Analysis cache hit");
        Some(entry.analysis)
    }

    async fn store(&self, content_hash: &str, analysis: AnalysisResult, ttl: Duration) {
        let key = self.cache_key(content_hash);

        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Analysis cache unavailable, dropping store");
                return;
            }
        };

        if ttl.as_secs() == 0 {
            let _: Result<(), _> = conn.del(&key).await;
            return;
        }

        let entry = AnalysisCacheEntry::new(content_hash, analysis, ttl);
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize analysis cache entry");
                return;
            }
        };

        // SET with EX replaces the whole value atomically.
        if let Err(e) = conn.set_ex::<_, _, ()>(&key, payload, ttl.as_secs()).await {
            warn!(key = %key, error = %e, "Analysis cache write failed, dropping store");
        }
    }

    async fn sweep_expired(&self) -> usize {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(_) => return 0,
        };

        let pattern = format!("{}:analysis:*", self.prefix);
        let keys = match scan_keys(&mut conn, &pattern).await {
            Ok(keys) => keys,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for key in keys {
            let payload: Option<String> = conn.get(&key).await.unwrap_or(None);
            let expired = payload
                .as_deref()
                .and_then(|p| serde_json::from_str::<AnalysisCacheEntry>(p).ok())
                .map(|entry| entry.is_expired())
                .unwrap_or(false);
            if expired && conn.del::<_, ()>(&key).await.is_ok() {
                removed += 1;
            }
        }

        removed
    }
}
