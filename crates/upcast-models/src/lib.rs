//! Shared data models for the Upcast scheduling engine.
//!
//! This crate provides Serde-serializable types for:
//! - Publishing channels and their daily quotas
//! - Upload queue items and the lifecycle state machine
//! - Analyzer output and the content-addressed analysis cache
//! - Upload history records
//! - Priority scoring

pub mod analysis;
pub mod channel;
pub mod history;
pub mod priority;
pub mod queue_item;
pub mod quota;

// Re-export common types
pub use analysis::{AnalysisCacheEntry, AnalysisResult, DEFAULT_ANALYSIS_TTL};
pub use channel::{Channel, ChannelKind};
pub use history::HistoryRecord;
pub use priority::{priority_for, DEFAULT_PRIORITY};
pub use queue_item::{NewQueueItem, QueueItem, QueueStatus, VideoMetadata};
pub use quota::QuotaCounter;
