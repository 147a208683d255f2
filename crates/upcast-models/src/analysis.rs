//! Analyzer output and the content-addressed analysis cache.
//!
//! Analysis is the expensive upstream step; results are cached by a strong
//! content hash of the source file so repeated ingestion of identical
//! content never re-invokes the analyzer within the cache horizon.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide cache horizon for analysis results.
pub const DEFAULT_ANALYSIS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Structured output of the external video analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Detected content category (lower-case)
    pub category: String,
    /// Detected content type (review, unboxing, tutorial, ...)
    pub content_type: String,
    /// Keywords extracted from the content
    pub keywords: Vec<String>,
    /// Product names detected in the content
    pub products: Vec<String>,
    /// Analyzer confidence, 0.0-1.0
    pub confidence: f32,
}

impl AnalysisResult {
    /// Category normalized for matching.
    pub fn category_key(&self) -> String {
        self.category.trim().to_lowercase()
    }
}

/// A cached analysis result with time-based expiry.
///
/// Entries are written as whole-value replacements; a lookup past
/// `expires_at` is a miss even if the entry was never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCacheEntry {
    /// Strong content hash of the source file (hex SHA-256)
    pub content_hash: String,
    pub analysis: AnalysisResult,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AnalysisCacheEntry {
    /// Create an entry expiring `ttl` from now.
    pub fn new(content_hash: impl Into<String>, analysis: AnalysisResult, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            content_hash: content_hash.into(),
            analysis,
            cached_at: now,
            expires_at: now + chrono::Duration::seconds(ttl.as_secs() as i64),
        }
    }

    /// Check expiry against the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against an explicit clock (used by tests).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            category: "Technology".into(),
            content_type: "review".into(),
            keywords: vec!["phone".into()],
            products: vec!["Phone X".into()],
            confidence: 0.9,
        }
    }

    #[test]
    fn test_category_key_normalized() {
        assert_eq!(sample_analysis().category_key(), "technology");
    }

    #[test]
    fn test_entry_expiry() {
        let entry = AnalysisCacheEntry::new("abc", sample_analysis(), Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert!(entry.is_expired_at(Utc::now() + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let entry = AnalysisCacheEntry::new("abc", sample_analysis(), Duration::ZERO);
        assert!(entry.is_expired());
    }
}
