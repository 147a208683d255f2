//! Capability traits for the engine's storage.
//!
//! Every scheduler worker shares these stores; the contracts below state
//! which operations the backend must make atomic. Mock implementations can
//! be swapped in for tests without touching the scheduler.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use upcast_models::{
    AnalysisResult, Channel, HistoryRecord, NewQueueItem, QueueItem, QueueStatus, VideoMetadata,
};

use crate::error::StoreResult;

/// The upload queue: every submitted item and its lifecycle state.
///
/// All mutating operations are conditioned on the item's current status
/// matching the operation's precondition; a mismatch fails with
/// [`crate::StoreError::Conflict`] instead of silently overwriting.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new item with status `pending` and a fresh id.
    async fn enqueue(&self, request: NewQueueItem) -> StoreResult<QueueItem>;

    /// Atomically claim the best eligible pending item for `worker`.
    ///
    /// Eligible means status `pending` and `scheduled_at` absent or in the
    /// past. Selection orders by priority descending, then creation time
    /// ascending (oldest first). The `pending -> processing` transition is
    /// conditional on the status still being `pending`; this is the sole
    /// guard against double-dispatch, so a caller that loses the race
    /// simply receives the next candidate or `None`.
    async fn claim_next(&self, worker: &str) -> StoreResult<Option<QueueItem>>;

    /// `processing -> ready`: commit the admission decision.
    async fn mark_ready(
        &self,
        id: &str,
        channel_id: &str,
        metadata: VideoMetadata,
    ) -> StoreResult<QueueItem>;

    /// `ready -> uploaded`: the publish side effect succeeded.
    async fn mark_uploaded(&self, id: &str) -> StoreResult<QueueItem>;

    /// `pending|processing|ready -> failed`: permanent failure.
    async fn mark_failed(&self, id: &str, reason: &str) -> StoreResult<QueueItem>;

    /// `processing|ready -> pending`: transient failure or quota
    /// exhaustion; increments the item's attempt counter. `not_before`
    /// defers the next scheduling pass for the item.
    async fn requeue(
        &self,
        id: &str,
        reason: Option<String>,
        not_before: Option<DateTime<Utc>>,
    ) -> StoreResult<QueueItem>;

    /// Operator path, `failed -> pending`: reset attempts and error.
    async fn retry_failed(&self, id: &str) -> StoreResult<QueueItem>;

    /// Record the content hash computed for an item.
    async fn set_content_hash(&self, id: &str, hash: &str) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<QueueItem>;

    /// List items, most recent first, optionally filtered by status.
    async fn list(&self, status: Option<QueueStatus>, limit: usize) -> StoreResult<Vec<QueueItem>>;

    /// Queue depth per status.
    async fn depth_by_status(&self) -> StoreResult<HashMap<QueueStatus, usize>>;
}

/// Per-channel-per-day admission counters.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Atomic increment-if-below-limit.
    ///
    /// Creates the (channel, day) counter lazily, and succeeds at most
    /// `limit` times per counter no matter how many callers race. This is
    /// the serialization point for admission: the backend itself provides
    /// the atomicity, never an in-process lock shared across workers.
    async fn try_reserve(&self, channel_id: &str, day: NaiveDate, limit: u32) -> StoreResult<bool>;

    /// Compensating decrement, floored at zero.
    ///
    /// Only used by the non-default release-on-publish-failure policy;
    /// the default policy never decrements a counter.
    async fn release(&self, channel_id: &str, day: NaiveDate) -> StoreResult<()>;

    /// Admissions used so far for one channel on `day`.
    async fn used(&self, channel_id: &str, day: NaiveDate) -> StoreResult<u32>;

    /// Admissions used per channel on `day`.
    ///
    /// Read-after-write consistent with `try_reserve` so ranking on
    /// remaining quota does not systematically starve a channel.
    async fn usage(&self, day: NaiveDate) -> StoreResult<HashMap<String, u32>>;
}

/// Read-mostly catalog of publishing channels.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Create or replace a channel.
    ///
    /// Validates that the daily quota is positive and that a parent
    /// reference is only set on a secondary channel pointing at an
    /// existing parent-less primary (hierarchy depth <= 1, no cycles).
    async fn upsert(&self, channel: Channel) -> StoreResult<()>;

    async fn find(&self, id: &str) -> StoreResult<Option<Channel>>;

    /// All channels, ordered by id.
    async fn list(&self) -> StoreResult<Vec<Channel>>;

    /// Active channels only, ordered by id.
    async fn list_active(&self) -> StoreResult<Vec<Channel>>;

    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()>;
}

/// Content-hash-keyed cache of analyzer output.
///
/// Unavailability of the backing store is deliberately absorbed: a failed
/// lookup is a miss (the pipeline re-invokes the analyzer) and a failed
/// store is dropped with a warning. Neither is ever fatal to admission.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Fetch a cached result; entries past their expiry are misses and are
    /// lazily invalidated.
    async fn lookup(&self, content_hash: &str) -> Option<AnalysisResult>;

    /// Store a result as an atomic whole-entry replacement.
    async fn store(&self, content_hash: &str, analysis: AnalysisResult, ttl: Duration);

    /// Drop expired entries eagerly. Optional maintenance; correctness
    /// relies on lazy invalidation at lookup time.
    async fn sweep_expired(&self) -> usize;
}

/// Immutable upload history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, record: HistoryRecord) -> StoreResult<()>;

    /// Most recent records first.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<HistoryRecord>>;

    /// Records derived from one queue item.
    async fn list_for_queue(&self, queue_id: &str) -> StoreResult<Vec<HistoryRecord>>;

    async fn count_for_day(&self, day: NaiveDate) -> StoreResult<usize>;
}
