//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use upcast_models::DEFAULT_ANALYSIS_TTL;

/// What happens to a reserved quota slot when the publish step fails.
///
/// The default consumes the slot: the failure is attributable to
/// publishing, not to channel eligibility, and the admission already
/// counted. The alternative hands the slot back for same-day reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPolicy {
    #[default]
    ConsumeOnPublishFailure,
    ReleaseOnPublishFailure,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent scheduler workers
    pub workers: usize,
    /// Sleep between claim attempts when the queue is empty
    pub poll_interval: Duration,
    /// Back-off after a store error in the claim loop
    pub idle_backoff: Duration,
    /// Total attempts per item before transient failures become permanent
    pub max_attempts: u32,
    /// Delay before a released item becomes claimable again
    pub retry_backoff: Duration,
    /// Bound on the external analyze call
    pub analyze_timeout: Duration,
    /// Bound on the external publish call
    pub publish_timeout: Duration,
    /// Cache horizon for analysis results
    pub analysis_ttl: Duration,
    /// Category to match against when nothing matches the detected one;
    /// `None` turns the fallback off and makes a no-match permanent
    pub fallback_category: Option<String>,
    /// Quota slot policy on publish failure
    pub quota_policy: QuotaPolicy,
    /// Channel snapshots are cached this long; a deactivated channel may
    /// still be offered within the window
    pub registry_refresh: Duration,
    /// Analyses below this confidence fail the item
    pub min_confidence: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_secs(5),
            idle_backoff: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(60),
            analyze_timeout: Duration::from_secs(120),
            publish_timeout: Duration::from_secs(300),
            analysis_ttl: DEFAULT_ANALYSIS_TTL,
            fallback_category: Some("lifestyle".to_string()),
            quota_policy: QuotaPolicy::default(),
            registry_refresh: Duration::from_secs(30),
            min_confidence: 0.3,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_parse("UPCAST_WORKERS", defaults.workers),
            poll_interval: env_secs("UPCAST_POLL_INTERVAL_SECS", defaults.poll_interval),
            idle_backoff: env_secs("UPCAST_IDLE_BACKOFF_SECS", defaults.idle_backoff),
            max_attempts: env_parse("UPCAST_MAX_ATTEMPTS", defaults.max_attempts),
            retry_backoff: env_secs("UPCAST_RETRY_BACKOFF_SECS", defaults.retry_backoff),
            analyze_timeout: env_secs("UPCAST_ANALYZE_TIMEOUT_SECS", defaults.analyze_timeout),
            publish_timeout: env_secs("UPCAST_PUBLISH_TIMEOUT_SECS", defaults.publish_timeout),
            analysis_ttl: env_secs("UPCAST_ANALYSIS_TTL_SECS", defaults.analysis_ttl),
            fallback_category: match std::env::var("UPCAST_FALLBACK_CATEGORY") {
                Ok(value) if value.trim().is_empty() || value.trim() == "none" => None,
                Ok(value) => Some(value.trim().to_lowercase()),
                Err(_) => defaults.fallback_category,
            },
            quota_policy: match std::env::var("UPCAST_QUOTA_POLICY").as_deref() {
                Ok("release") => QuotaPolicy::ReleaseOnPublishFailure,
                Ok("consume") => QuotaPolicy::ConsumeOnPublishFailure,
                _ => defaults.quota_policy,
            },
            registry_refresh: env_secs("UPCAST_REGISTRY_REFRESH_SECS", defaults.registry_refresh),
            min_confidence: env_parse("UPCAST_MIN_CONFIDENCE", defaults.min_confidence),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
