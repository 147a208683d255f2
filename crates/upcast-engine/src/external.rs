//! External collaborator seams.
//!
//! The analyzer, metadata generator and publisher are black boxes to the
//! engine. Each is a capability trait with a uniform two-way failure
//! outcome so the scheduler can route every result through the same retry
//! taxonomy, and so tests can swap in mock implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use upcast_models::{AnalysisResult, Channel, VideoMetadata};

use crate::error::EngineError;

/// Failure outcome of an external call.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Worth retrying: timeout, rate limit, flaky transport.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying cannot help: bad input, rejected content, missing account.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl CallError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient(_))
    }
}

impl From<CallError> for EngineError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Transient(msg) => EngineError::Transient(msg),
            CallError::Permanent(msg) => EngineError::Permanent(msg),
        }
    }
}

/// Identifier handed back by the publishing platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub publish_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Content analysis. May take seconds and may rate-limit; the scheduler
/// bounds it with a timeout and treats the timeout as transient.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, source_path: &str) -> Result<AnalysisResult, CallError>;
}

/// Title/description/tags generation. Pure and fast; failures are
/// surfaced on the item as permanent.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(
        &self,
        analysis: &AnalysisResult,
        channel: &Channel,
    ) -> Result<VideoMetadata, CallError>;
}

/// The only side-effecting external call. Idempotency is not assumed, so
/// the scheduler invokes it at most once per ready-to-uploaded attempt.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        channel: &Channel,
        source_path: &str,
        metadata: &VideoMetadata,
    ) -> Result<PublishReceipt, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_maps_into_engine_taxonomy() {
        let transient: EngineError = CallError::transient("rate limited").into();
        assert!(transient.is_transient());

        let permanent: EngineError = CallError::permanent("account suspended").into();
        assert!(permanent.is_permanent());
    }
}
