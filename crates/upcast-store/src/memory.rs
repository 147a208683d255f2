//! In-memory store backend.
//!
//! Backs the engine's tests and single-process deployments. A single
//! `tokio::sync::Mutex` scopes every conditional update, which makes
//! `claim_next` and `try_reserve` indivisible; no lock is ever held across
//! an await point, so workers cannot wedge each other.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;

use upcast_models::{
    AnalysisCacheEntry, AnalysisResult, Channel, ChannelKind, HistoryRecord, NewQueueItem,
    QueueItem, QueueStatus, QuotaCounter, VideoMetadata,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AnalysisCache, ChannelRegistry, HistoryStore, QueueStore, QuotaLedger};

#[derive(Default)]
struct Inner {
    items: HashMap<String, QueueItem>,
    channels: HashMap<String, Channel>,
    counters: HashMap<(String, NaiveDate), QuotaCounter>,
    cache: HashMap<String, AnalysisCacheEntry>,
    history: Vec<HistoryRecord>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Fetch an item and check the expected-status precondition.
fn checked_item<'a>(
    inner: &'a mut Inner,
    id: &str,
    expected: &[QueueStatus],
    operation: &str,
) -> StoreResult<&'a mut QueueItem> {
    let item = inner
        .items
        .get_mut(id)
        .ok_or_else(|| StoreError::not_found(format!("queue item {}", id)))?;

    if !expected.contains(&item.status) {
        return Err(StoreError::conflict(format!(
            "queue item {}: {} not allowed from {}",
            id, operation, item.status
        )));
    }

    Ok(item)
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(&self, request: NewQueueItem) -> StoreResult<QueueItem> {
        let item = QueueItem::from_request(request);
        let mut inner = self.inner.lock().await;
        inner.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn claim_next(&self, worker: &str) -> StoreResult<Option<QueueItem>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        // Priority descending, then oldest first, then id for a stable order.
        let best = inner
            .items
            .values()
            .filter(|item| item.is_eligible(now))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|item| item.id.clone());

        let Some(id) = best else {
            return Ok(None);
        };

        // The lock spans selection and transition, so the status is still
        // pending here; the conditional check stays for the contract.
        let item = checked_item(&mut inner, &id, &[QueueStatus::Pending], "claim")?;
        item.claim(worker);
        Ok(Some(item.clone()))
    }

    async fn mark_ready(
        &self,
        id: &str,
        channel_id: &str,
        metadata: VideoMetadata,
    ) -> StoreResult<QueueItem> {
        let mut inner = self.inner.lock().await;
        let item = checked_item(&mut inner, id, &[QueueStatus::Processing], "mark_ready")?;
        item.mark_ready(channel_id, metadata);
        Ok(item.clone())
    }

    async fn mark_uploaded(&self, id: &str) -> StoreResult<QueueItem> {
        let mut inner = self.inner.lock().await;
        let item = checked_item(&mut inner, id, &[QueueStatus::Ready], "mark_uploaded")?;
        item.mark_uploaded();
        Ok(item.clone())
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> StoreResult<QueueItem> {
        let mut inner = self.inner.lock().await;
        let item = checked_item(
            &mut inner,
            id,
            &[QueueStatus::Pending, QueueStatus::Processing, QueueStatus::Ready],
            "mark_failed",
        )?;
        item.mark_failed(reason);
        Ok(item.clone())
    }

    async fn requeue(
        &self,
        id: &str,
        reason: Option<String>,
        not_before: Option<chrono::DateTime<Utc>>,
    ) -> StoreResult<QueueItem> {
        let mut inner = self.inner.lock().await;
        let item = checked_item(
            &mut inner,
            id,
            &[QueueStatus::Processing, QueueStatus::Ready],
            "requeue",
        )?;
        item.release(reason, not_before);
        Ok(item.clone())
    }

    async fn retry_failed(&self, id: &str) -> StoreResult<QueueItem> {
        let mut inner = self.inner.lock().await;
        let item = checked_item(&mut inner, id, &[QueueStatus::Failed], "retry_failed")?;
        item.reset_for_retry();
        Ok(item.clone())
    }

    async fn set_content_hash(&self, id: &str, hash: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("queue item {}", id)))?;
        item.content_hash = Some(hash.to_string());
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<QueueItem> {
        let inner = self.inner.lock().await;
        inner
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("queue item {}", id)))
    }

    async fn list(&self, status: Option<QueueStatus>, limit: usize) -> StoreResult<Vec<QueueItem>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<QueueItem> = inner
            .items
            .values()
            .filter(|item| status.map(|s| item.status == s).unwrap_or(true))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn depth_by_status(&self) -> StoreResult<HashMap<QueueStatus, usize>> {
        let inner = self.inner.lock().await;
        let mut depth = HashMap::new();
        for item in inner.items.values() {
            *depth.entry(item.status).or_insert(0) += 1;
        }
        Ok(depth)
    }
}

#[async_trait]
impl QuotaLedger for MemoryStore {
    async fn try_reserve(&self, channel_id: &str, day: NaiveDate, limit: u32) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let key = (channel_id.to_string(), day);

        match inner.counters.get_mut(&key) {
            Some(counter) => {
                if counter.count < limit {
                    counter.increment();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            None => {
                if limit == 0 {
                    return Ok(false);
                }
                inner.counters.insert(key, QuotaCounter::first(channel_id, day));
                Ok(true)
            }
        }
    }

    async fn release(&self, channel_id: &str, day: NaiveDate) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(counter) = inner.counters.get_mut(&(channel_id.to_string(), day)) {
            counter.count = counter.count.saturating_sub(1);
        }
        Ok(())
    }

    async fn used(&self, channel_id: &str, day: NaiveDate) -> StoreResult<u32> {
        let inner = self.inner.lock().await;
        Ok(inner
            .counters
            .get(&(channel_id.to_string(), day))
            .map(|counter| counter.count)
            .unwrap_or(0))
    }

    async fn usage(&self, day: NaiveDate) -> StoreResult<HashMap<String, u32>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .counters
            .iter()
            .filter(|((_, counter_day), _)| *counter_day == day)
            .map(|((channel_id, _), counter)| (channel_id.clone(), counter.count))
            .collect())
    }
}

#[async_trait]
impl ChannelRegistry for MemoryStore {
    async fn upsert(&self, mut channel: Channel) -> StoreResult<()> {
        channel.category = channel.category.trim().to_lowercase();

        if channel.daily_quota == 0 {
            return Err(StoreError::invalid_channel(format!(
                "channel {}: daily quota must be positive",
                channel.id
            )));
        }

        let mut inner = self.inner.lock().await;

        if let Some(parent_id) = &channel.parent_id {
            if channel.kind != ChannelKind::Secondary {
                return Err(StoreError::invalid_channel(format!(
                    "channel {}: only secondary channels may reference a parent",
                    channel.id
                )));
            }
            if parent_id == &channel.id {
                return Err(StoreError::invalid_channel(format!(
                    "channel {}: cannot be its own parent",
                    channel.id
                )));
            }
            let parent = inner.channels.get(parent_id).ok_or_else(|| {
                StoreError::invalid_channel(format!(
                    "channel {}: parent {} does not exist",
                    channel.id, parent_id
                ))
            })?;
            if parent.kind != ChannelKind::Primary || parent.parent_id.is_some() {
                return Err(StoreError::invalid_channel(format!(
                    "channel {}: parent {} must be a top-level primary channel",
                    channel.id, parent_id
                )));
            }
        }

        inner.channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    async fn find(&self, id: &str) -> StoreResult<Option<Channel>> {
        let inner = self.inner.lock().await;
        Ok(inner.channels.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Channel>> {
        let inner = self.inner.lock().await;
        let mut channels: Vec<Channel> = inner.channels.values().cloned().collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(channels)
    }

    async fn list_active(&self) -> StoreResult<Vec<Channel>> {
        let mut channels = ChannelRegistry::list(self).await?;
        channels.retain(|channel| channel.active);
        Ok(channels)
    }

    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let channel = inner
            .channels
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("channel {}", id)))?;
        channel.active = active;
        Ok(())
    }
}

#[async_trait]
impl AnalysisCache for MemoryStore {
    async fn lookup(&self, content_hash: &str) -> Option<AnalysisResult> {
        let mut inner = self.inner.lock().await;
        match inner.cache.get(content_hash) {
            Some(entry) if !entry.is_expired() => Some(entry.analysis.clone()),
            Some(_) => {
                // Lazy invalidation of the expired entry.
                inner.cache.remove(content_hash);
                None
            }
            None => None,
        }
    }

    async fn store(&self, content_hash: &str, analysis: AnalysisResult, ttl: Duration) {
        let entry = AnalysisCacheEntry::new(content_hash, analysis, ttl);
        let mut inner = self.inner.lock().await;
        inner.cache.insert(content_hash.to_string(), entry);
    }

    async fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.cache.len();
        inner.cache.retain(|_, entry| !entry.is_expired());
        before - inner.cache.len()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn record(&self, record: HistoryRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.history.push(record);
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<HistoryRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.history.iter().rev().take(limit).cloned().collect())
    }

    async fn list_for_queue(&self, queue_id: &str) -> StoreResult<Vec<HistoryRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .history
            .iter()
            .filter(|record| record.queue_id == queue_id)
            .cloned()
            .collect())
    }

    async fn count_for_day(&self, day: NaiveDate) -> StoreResult<usize> {
        let inner = self.inner.lock().await;
        Ok(inner
            .history
            .iter()
            .filter(|record| record.uploaded_at.date_naive() == day)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_age() {
        let store = MemoryStore::new();

        let low = store
            .enqueue(NewQueueItem::new("/v/low.mp4").with_priority(10))
            .await
            .unwrap();
        let high = store
            .enqueue(NewQueueItem::new("/v/high.mp4").with_priority(90))
            .await
            .unwrap();

        let first = store.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(first.id, high.id);
        let second = store.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(second.id, low.id);
        assert!(store.claim_next("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_conflict() {
        let store = MemoryStore::new();
        let item = store.enqueue(NewQueueItem::new("/v/a.mp4")).await.unwrap();

        // mark_ready requires processing
        let err = store
            .mark_ready(
                &item.id,
                "ch-1",
                VideoMetadata {
                    title: "t".into(),
                    description: "d".into(),
                    tags: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_quota_counter_created_lazily() {
        let store = MemoryStore::new();
        let day = Utc::now().date_naive();

        assert_eq!(store.used("ch-1", day).await.unwrap(), 0);
        assert!(store.try_reserve("ch-1", day, 2).await.unwrap());
        assert_eq!(store.used("ch-1", day).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_registry_rejects_deep_hierarchy() {
        let store = MemoryStore::new();
        store
            .upsert(Channel::new("main", "Main", "tech", ChannelKind::Primary, 3))
            .await
            .unwrap();
        store
            .upsert(
                Channel::new("sub", "Sub", "tech", ChannelKind::Secondary, 2).with_parent("main"),
            )
            .await
            .unwrap();

        // A parent must be primary
        let err = store
            .upsert(
                Channel::new("sub2", "Sub2", "tech", ChannelKind::Secondary, 2).with_parent("sub"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidChannel(_)));

        // Only secondary channels may carry a parent
        let err = store
            .upsert(
                Channel::new("main2", "Main2", "tech", ChannelKind::Primary, 3).with_parent("main"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidChannel(_)));
    }
}
