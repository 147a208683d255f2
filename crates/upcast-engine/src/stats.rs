//! Observability projections.
//!
//! Read-only views over the stores: queue depth by status, per-channel
//! remaining quota for today, and per-item state with derived history.
//! These back any dashboard or CLI; the surfaces themselves live outside
//! the engine.

use std::collections::BTreeMap;

use chrono::Utc;
use metrics::gauge;
use serde::Serialize;

use upcast_models::{HistoryRecord, QueueItem, QueueStatus};

use crate::error::EngineResult;
use crate::scheduler::EngineStores;

/// Today's quota standing for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelQuotaStat {
    pub channel_id: String,
    pub name: String,
    pub kind: String,
    pub daily_quota: u32,
    pub used_today: u32,
    pub remaining_today: u32,
    pub active: bool,
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Queue depth per status, zero-filled for absent statuses
    pub queue_depth: BTreeMap<String, usize>,
    pub channels: Vec<ChannelQuotaStat>,
    pub uploads_today: usize,
}

impl EngineStats {
    /// Collect a snapshot and record the matching gauges.
    pub async fn snapshot(stores: &EngineStores) -> EngineResult<Self> {
        let depth = stores.queue.depth_by_status().await?;
        let mut queue_depth = BTreeMap::new();
        for status in QueueStatus::all() {
            queue_depth.insert(
                status.as_str().to_string(),
                depth.get(&status).copied().unwrap_or(0),
            );
        }

        let today = Utc::now().date_naive();
        let usage = stores.ledger.usage(today).await?;
        let channels = stores
            .registry
            .list()
            .await?
            .into_iter()
            .map(|channel| {
                let used = usage.get(&channel.id).copied().unwrap_or(0);
                ChannelQuotaStat {
                    remaining_today: channel.daily_quota.saturating_sub(used),
                    used_today: used,
                    kind: channel.kind.to_string(),
                    channel_id: channel.id,
                    name: channel.name,
                    daily_quota: channel.daily_quota,
                    active: channel.active,
                }
            })
            .collect();

        let uploads_today = stores.history.count_for_day(today).await?;

        let stats = Self {
            queue_depth,
            channels,
            uploads_today,
        };
        stats.record_gauges();
        Ok(stats)
    }

    fn record_gauges(&self) {
        for (status, depth) in &self.queue_depth {
            gauge!("upcast_queue_depth", "status" => status.clone()).set(*depth as f64);
        }
        for channel in &self.channels {
            gauge!(
                "upcast_channel_remaining_quota",
                "channel" => channel.channel_id.clone()
            )
            .set(channel.remaining_today as f64);
        }
    }
}

/// Per-item state with the history records derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub item: QueueItem,
    pub history: Vec<HistoryRecord>,
}

impl ItemDetail {
    pub async fn fetch(stores: &EngineStores, id: &str) -> EngineResult<Self> {
        let item = stores.queue.get(id).await?;
        let history = stores.history.list_for_queue(id).await?;
        Ok(Self { item, history })
    }
}
