//! Upload queue items and their lifecycle state machine.
//!
//! A queue item is the unit of work for the scheduler. Items move
//! `pending -> processing -> ready -> uploaded`, with `failed` as the
//! terminal failure state; `processing` and `ready` may fall back to
//! `pending` on transient failure or quota exhaustion. Terminal rows are
//! retained as an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for a scheduler worker
    #[default]
    Pending,
    /// Claimed by a worker, admission in progress
    Processing,
    /// Channel reserved and metadata attached; publish not yet performed
    Ready,
    /// Published successfully (terminal)
    Uploaded,
    /// Failed permanently or out of retry budget (terminal)
    Failed,
}

impl QueueStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Ready => "ready",
            QueueStatus::Uploaded => "uploaded",
            QueueStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Uploaded | QueueStatus::Failed)
    }

    /// Check whether a transition to `next` is allowed.
    ///
    /// No state may skip `Processing`; `Failed` items may only re-enter the
    /// queue through the operator retry path (`Failed -> Pending`).
    pub fn can_transition(&self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        match self {
            Pending => matches!(next, Processing | Failed),
            Processing => matches!(next, Ready | Failed | Pending),
            Ready => matches!(next, Uploaded | Failed | Pending),
            Uploaded => false,
            Failed => matches!(next, Pending),
        }
    }

    /// All statuses, in queue-display order.
    pub fn all() -> [QueueStatus; 5] {
        [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Ready,
            QueueStatus::Uploaded,
            QueueStatus::Failed,
        ]
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generated publish metadata attached to an item once available.
///
/// Opaque to the admission core; produced by the external metadata
/// generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Request payload for enqueueing a new upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueItem {
    /// Path to the source video file
    pub source_path: String,
    /// File name, derived from the path when not given
    pub source_name: String,
    /// File size in megabytes, when known at ingestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<f64>,
    /// Pre-assigned channel hint (tried before the matcher)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Pre-generated metadata, when the caller already has it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,
    /// Affiliate product link carried through to publishing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_link: Option<String>,
    /// Queue priority, 0-100, higher is sooner
    pub priority: u8,
    /// Do not schedule before this time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewQueueItem {
    /// Create a request with default priority and a name derived from the path.
    pub fn new(source_path: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let source_name = source_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(source_path.as_str())
            .to_string();
        Self {
            source_path,
            source_name,
            file_size_mb: None,
            channel_id: None,
            metadata: None,
            product_link: None,
            priority: crate::priority::DEFAULT_PRIORITY,
            scheduled_at: None,
        }
    }

    /// Set the queue priority (clamped to 0-100).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    /// Set a pre-assigned channel hint.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Set a not-before schedule time.
    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// A queued upload and its full lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique queue item identifier (UUID v4)
    pub id: String,
    pub source_path: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<f64>,
    /// Strong content hash of the source file, filled on first analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Assigned channel; `None` until an admission commits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_link: Option<String>,
    pub status: QueueStatus,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Number of scheduling passes that have released this item back to pending
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Worker currently holding the item (non-terminal, non-pending states)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Materialize a pending item from an enqueue request, assigning an id.
    pub fn from_request(request: NewQueueItem) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_path: request.source_path,
            source_name: request.source_name,
            file_size_mb: request.file_size_mb,
            content_hash: None,
            channel_id: request.channel_id,
            metadata: request.metadata,
            product_link: request.product_link,
            status: QueueStatus::Pending,
            priority: request.priority.min(100),
            scheduled_at: request.scheduled_at,
            attempts: 0,
            error_message: None,
            claimed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the item is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the item is eligible for claiming at `now`.
    ///
    /// Eligible means pending and not scheduled for a future time.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending
            && self.scheduled_at.map(|at| at <= now).unwrap_or(true)
    }

    /// Transition to `Processing` under the given worker.
    pub fn claim(&mut self, worker: &str) {
        self.status = QueueStatus::Processing;
        self.claimed_by = Some(worker.to_string());
        self.updated_at = Utc::now();
    }

    /// Commit an admission decision: channel reserved, metadata attached.
    pub fn mark_ready(&mut self, channel_id: impl Into<String>, metadata: VideoMetadata) {
        self.status = QueueStatus::Ready;
        self.channel_id = Some(channel_id.into());
        self.metadata = Some(metadata);
        self.updated_at = Utc::now();
    }

    /// Record a successful publish.
    pub fn mark_uploaded(&mut self) {
        self.status = QueueStatus::Uploaded;
        self.error_message = None;
        self.claimed_by = None;
        self.updated_at = Utc::now();
    }

    /// Record a permanent failure.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = QueueStatus::Failed;
        self.error_message = Some(reason.into());
        self.claimed_by = None;
        self.updated_at = Utc::now();
    }

    /// Return the item to the pending pool, counting the attempt.
    ///
    /// `not_before` reschedules the next pass; without it a bounced item
    /// would be re-claimed immediately and spin against the same condition.
    pub fn release(&mut self, reason: Option<String>, not_before: Option<DateTime<Utc>>) {
        self.status = QueueStatus::Pending;
        self.attempts += 1;
        self.error_message = reason;
        self.claimed_by = None;
        if not_before.is_some() {
            self.scheduled_at = not_before;
        }
        self.updated_at = Utc::now();
    }

    /// Operator retry: reset a failed item for another pass.
    pub fn reset_for_retry(&mut self) {
        self.status = QueueStatus::Pending;
        self.attempts = 0;
        self.error_message = None;
        self.claimed_by = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transition_table() {
        use QueueStatus::*;

        assert!(Pending.can_transition(Processing));
        assert!(Pending.can_transition(Failed));
        assert!(!Pending.can_transition(Ready));
        assert!(!Pending.can_transition(Uploaded));

        assert!(Processing.can_transition(Ready));
        assert!(Processing.can_transition(Pending));
        assert!(Processing.can_transition(Failed));
        assert!(!Processing.can_transition(Uploaded));

        assert!(Ready.can_transition(Uploaded));
        assert!(Ready.can_transition(Pending));
        assert!(Ready.can_transition(Failed));

        assert!(!Uploaded.can_transition(Pending));
        assert!(!Uploaded.can_transition(Failed));

        assert!(Failed.can_transition(Pending));
        assert!(!Failed.can_transition(Processing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(QueueStatus::Uploaded.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(!QueueStatus::Ready.is_terminal());
    }

    #[test]
    fn test_new_item_defaults() {
        let item = QueueItem::from_request(NewQueueItem::new("/videos/review.mp4"));
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.priority, 50);
        assert_eq!(item.source_name, "review.mp4");
        assert_eq!(item.attempts, 0);
        assert!(item.channel_id.is_none());
        assert!(item.is_eligible(Utc::now()));
    }

    #[test]
    fn test_priority_clamped() {
        let request = NewQueueItem::new("/videos/a.mp4").with_priority(250);
        assert_eq!(request.priority, 100);
    }

    #[test]
    fn test_scheduled_item_not_eligible_before_time() {
        let future = Utc::now() + chrono::Duration::hours(2);
        let item =
            QueueItem::from_request(NewQueueItem::new("/videos/a.mp4").with_scheduled_at(future));
        assert!(!item.is_eligible(Utc::now()));
        assert!(item.is_eligible(future));
    }

    #[test]
    fn test_release_counts_attempt_and_clears_claim() {
        let mut item = QueueItem::from_request(NewQueueItem::new("/videos/a.mp4"));
        item.claim("worker-1");
        assert_eq!(item.status, QueueStatus::Processing);
        assert_eq!(item.claimed_by.as_deref(), Some("worker-1"));

        item.release(Some("analyzer timeout".into()), None);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 1);
        assert!(item.claimed_by.is_none());
        assert_eq!(item.error_message.as_deref(), Some("analyzer timeout"));
    }

    #[test]
    fn test_release_with_backoff_defers_next_pass() {
        let mut item = QueueItem::from_request(NewQueueItem::new("/videos/a.mp4"));
        item.claim("worker-1");

        let later = Utc::now() + chrono::Duration::minutes(1);
        item.release(None, Some(later));
        assert_eq!(item.status, QueueStatus::Pending);
        assert!(!item.is_eligible(Utc::now()));
        assert!(item.is_eligible(later));
    }

    #[test]
    fn test_queue_item_serde_roundtrip() {
        let mut item = QueueItem::from_request(NewQueueItem::new("/videos/a.mp4"));
        item.claim("worker-1");
        item.mark_ready(
            "ch-1",
            VideoMetadata {
                title: "Title".into(),
                description: "Desc".into(),
                tags: vec!["tag".into()],
            },
        );

        let json = serde_json::to_string(&item).unwrap();
        let back: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, QueueStatus::Ready);
        assert_eq!(back.channel_id.as_deref(), Some("ch-1"));
        assert_eq!(back.id, item.id);
    }
}
