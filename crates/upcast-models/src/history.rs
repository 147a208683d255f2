//! Immutable upload history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot written exactly once when a queue item reaches `uploaded`.
///
/// Post-publish metrics are reconciled onto this record by an external
/// process; the engine only writes the initial row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    /// Queue item this record derives from
    pub queue_id: String,
    /// Channel the upload went to
    pub channel_id: String,
    pub source_name: String,
    /// Platform-side identifier returned by the publisher
    pub publish_ref: String,
    pub uploaded_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Create a record for a just-published item.
    pub fn new(
        queue_id: impl Into<String>,
        channel_id: impl Into<String>,
        source_name: impl Into<String>,
        publish_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            queue_id: queue_id.into(),
            channel_id: channel_id.into(),
            source_name: source_name.into(),
            publish_ref: publish_ref.into(),
            uploaded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_record_links_back() {
        let record = HistoryRecord::new("queue-1", "ch-1", "review.mp4", "yt-abc123");
        assert_eq!(record.queue_id, "queue-1");
        assert_eq!(record.channel_id, "ch-1");
        assert_eq!(record.publish_ref, "yt-abc123");
        assert!(!record.id.is_empty());
    }
}
