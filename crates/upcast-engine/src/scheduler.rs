//! The scheduler control loop.
//!
//! Workers are equally-privileged claim loops sharing the stores; the only
//! coordination between them is the atomic claim on the queue and the
//! atomic quota reservation in the ledger. No lock is held across the
//! external analyze/publish calls.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::counter;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use upcast_models::{AnalysisResult, Channel, HistoryRecord, QueueItem};
use upcast_store::{
    AnalysisCache, ChannelRegistry, HistoryStore, MemoryStore, QueueStore, QuotaLedger,
};

use crate::admission;
use crate::config::{EngineConfig, QuotaPolicy};
use crate::error::{EngineError, EngineResult};
use crate::external::{CallError, PublishReceipt};
use crate::hash;
use crate::matcher;

/// The stores shared by every worker.
#[derive(Clone)]
pub struct EngineStores {
    pub queue: Arc<dyn QueueStore>,
    pub ledger: Arc<dyn QuotaLedger>,
    pub registry: Arc<dyn ChannelRegistry>,
    pub cache: Arc<dyn AnalysisCache>,
    pub history: Arc<dyn HistoryStore>,
}

impl EngineStores {
    /// Wire every role to one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            queue: store.clone(),
            ledger: store.clone(),
            registry: store.clone(),
            cache: store.clone(),
            history: store,
        }
    }
}

/// The external collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn crate::external::Analyzer>,
    pub generator: Arc<dyn crate::external::MetadataGenerator>,
    pub publisher: Arc<dyn crate::external::Publisher>,
}

/// Cached channel snapshot with bounded staleness.
struct RegistrySnapshot {
    channels: Vec<Channel>,
    fetched_at: Instant,
}

/// Scheduler driving queue items through admission and publishing.
pub struct Scheduler {
    config: EngineConfig,
    stores: EngineStores,
    collaborators: Collaborators,
    shutdown: watch::Sender<bool>,
    registry_cache: Mutex<Option<RegistrySnapshot>>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(config: EngineConfig, stores: EngineStores, collaborators: Collaborators) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            stores,
            collaborators,
            shutdown,
            registry_cache: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stores(&self) -> &EngineStores {
        &self.stores
    }

    /// Run the worker loops until shutdown.
    ///
    /// The loop never terminates on a single item's failure; every item
    /// outcome is absorbed into a state transition.
    pub async fn run(self: Arc<Self>) {
        info!(workers = self.config.workers, "Starting scheduler");

        let mut handles = Vec::new();
        for _ in 0..self.config.workers.max(1) {
            let scheduler = Arc::clone(&self);
            let worker = format!("worker-{}", Uuid::new_v4());
            handles.push(tokio::spawn(async move {
                scheduler.worker_loop(worker).await;
            }));
        }

        for handle in handles {
            handle.await.ok();
        }

        info!("Scheduler stopped");
    }

    /// Signal shutdown to every worker.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Drain currently eligible items with a single worker pass.
    ///
    /// Claims until the queue yields no eligible item; released items with
    /// a retry back-off fall out of eligibility and end the pass. Used by
    /// tests and the dry-run binary; the continuous loop is [`Self::run`].
    pub async fn run_once(&self, worker: &str) -> usize {
        let mut processed = 0;
        loop {
            match self.stores.queue.claim_next(worker).await {
                Ok(Some(item)) => {
                    self.handle_item(worker, item).await;
                    processed += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(worker, error = %e, "Claim failed");
                    break;
                }
            }
        }
        processed
    }

    async fn worker_loop(&self, worker: String) {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!(worker = %worker, "Worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.stores.queue.claim_next(&worker).await {
                Ok(Some(item)) => {
                    self.handle_item(&worker, item).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Claim failed, backing off");
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.idle_backoff) => {}
                    }
                }
            }
        }

        info!(worker = %worker, "Worker stopped");
    }

    /// Process one claimed item and absorb its outcome.
    async fn handle_item(&self, worker: &str, item: QueueItem) {
        let item_id = item.id.clone();
        let attempts = item.attempts;

        match self.process_item(worker, item).await {
            Ok(receipt) => {
                counter!("upcast_items_uploaded_total").increment(1);
                info!(
                    item_id = %item_id,
                    publish_ref = %receipt.publish_ref,
                    worker,
                    "Item uploaded"
                );
            }
            Err(e) => self.handle_failure(worker, &item_id, attempts, e).await,
        }
    }

    /// Route a failure into the right state transition.
    async fn handle_failure(&self, worker: &str, item_id: &str, attempts: u32, error: EngineError) {
        let not_before = Utc::now()
            + chrono::Duration::seconds(self.config.retry_backoff.as_secs() as i64);

        match error {
            EngineError::QuotaExhausted => {
                counter!("upcast_items_requeued_total", "cause" => "quota").increment(1);
                info!(item_id, worker, "All eligible channels at quota, requeueing");
                if let Err(e) = self
                    .stores
                    .queue
                    .requeue(
                        item_id,
                        Some("all eligible channels at daily quota".to_string()),
                        Some(not_before),
                    )
                    .await
                {
                    warn!(item_id, error = %e, "Failed to requeue item");
                }
            }
            EngineError::Transient(msg) => {
                if attempts + 1 >= self.config.max_attempts {
                    counter!("upcast_items_failed_total", "cause" => "transient_exhausted")
                        .increment(1);
                    warn!(item_id, worker, attempts = attempts + 1, "Retry budget exhausted");
                    let reason = format!(
                        "transient failures exhausted after {} attempts: {}",
                        attempts + 1,
                        msg
                    );
                    if let Err(e) = self.stores.queue.mark_failed(item_id, &reason).await {
                        warn!(item_id, error = %e, "Failed to mark item failed");
                    }
                } else {
                    counter!("upcast_items_requeued_total", "cause" => "transient").increment(1);
                    info!(item_id, worker, error = %msg, "Transient failure, requeueing");
                    if let Err(e) = self
                        .stores
                        .queue
                        .requeue(item_id, Some(msg), Some(not_before))
                        .await
                    {
                        warn!(item_id, error = %e, "Failed to requeue item");
                    }
                }
            }
            EngineError::Conflict(msg) => {
                // Another worker won; abandon without touching the item.
                debug!(item_id, worker, "Lost race: {}", msg);
            }
            other => {
                counter!("upcast_items_failed_total", "cause" => "permanent").increment(1);
                warn!(item_id, worker, error = %other, "Permanent failure");
                if let Err(e) = self.stores.queue.mark_failed(item_id, &other.to_string()).await {
                    warn!(item_id, error = %e, "Failed to mark item failed");
                }
            }
        }
    }

    /// The per-item pipeline: hash, analyze, admit, generate, publish.
    async fn process_item(&self, worker: &str, item: QueueItem) -> EngineResult<PublishReceipt> {
        debug!(item_id = %item.id, worker, attempts = item.attempts, "Processing item");

        let content_hash = match item.content_hash.clone() {
            Some(hash) => hash,
            None => {
                let hash = hash::content_hash(&item.source_path).await?;
                self.stores.queue.set_content_hash(&item.id, &hash).await?;
                hash
            }
        };

        let analysis = self.resolve_analysis(&content_hash, &item.source_path).await?;
        if analysis.confidence < self.config.min_confidence {
            return Err(EngineError::permanent(format!(
                "analysis confidence {:.2} below threshold {:.2}",
                analysis.confidence, self.config.min_confidence
            )));
        }

        let today = Utc::now().date_naive();
        let channels = self.active_channels().await?;
        let channel = self.admit_channel(&item, &analysis, &channels, today).await?;

        let metadata = match item.metadata.clone() {
            Some(metadata) => metadata,
            None => self
                .collaborators
                .generator
                .generate(&analysis, &channel)
                .await
                .map_err(|e| {
                    EngineError::permanent(format!("metadata generation failed: {}", e))
                })?,
        };

        // Decision committed before the side effect: a crash here leaves an
        // auditable ready row, not a silent quota leak.
        self.stores
            .queue
            .mark_ready(&item.id, &channel.id, metadata.clone())
            .await?;

        let receipt = match tokio::time::timeout(
            self.config.publish_timeout,
            self.collaborators
                .publisher
                .publish(&channel, &item.source_path, &metadata),
        )
        .await
        {
            Err(_) => Err(CallError::transient("publish timed out")),
            Ok(result) => result,
        };

        match receipt {
            Ok(receipt) => {
                let uploaded = self.stores.queue.mark_uploaded(&item.id).await?;
                self.stores
                    .history
                    .record(HistoryRecord::new(
                        &uploaded.id,
                        &channel.id,
                        &uploaded.source_name,
                        &receipt.publish_ref,
                    ))
                    .await?;
                Ok(receipt)
            }
            Err(e) => {
                if self.config.quota_policy == QuotaPolicy::ReleaseOnPublishFailure {
                    if let Err(release_err) = self.stores.ledger.release(&channel.id, today).await
                    {
                        warn!(
                            channel_id = %channel.id,
                            error = %release_err,
                            "Failed to hand back quota slot"
                        );
                    }
                }
                Err(match e {
                    CallError::Transient(msg) => {
                        EngineError::Transient(format!("publish failed: {}", msg))
                    }
                    CallError::Permanent(msg) => {
                        EngineError::Permanent(format!("publish failed: {}", msg))
                    }
                })
            }
        }
    }

    /// Resolve analysis through the cache, invoking the analyzer on a miss.
    async fn resolve_analysis(
        &self,
        content_hash: &str,
        source_path: &str,
    ) -> EngineResult<AnalysisResult> {
        if let Some(hit) = self.stores.cache.lookup(content_hash).await {
            counter!("upcast_analysis_cache_hits_total").increment(1);
            debug!(content_hash, "Analysis cache hit");
            return Ok(hit);
        }
        counter!("upcast_analysis_cache_misses_total").increment(1);

        let analysis = match tokio::time::timeout(
            self.config.analyze_timeout,
            self.collaborators.analyzer.analyze(source_path),
        )
        .await
        {
            Err(_) => return Err(EngineError::transient("analyzer timed out")),
            Ok(Err(CallError::Transient(msg))) => {
                return Err(EngineError::Transient(format!("analyzer: {}", msg)))
            }
            Ok(Err(CallError::Permanent(msg))) => {
                return Err(EngineError::Permanent(format!("analyzer: {}", msg)))
            }
            Ok(Ok(analysis)) => analysis,
        };

        self.stores
            .cache
            .store(content_hash, analysis.clone(), self.config.analysis_ttl)
            .await;

        Ok(analysis)
    }

    /// Pick and reserve a channel for the item.
    async fn admit_channel(
        &self,
        item: &QueueItem,
        analysis: &AnalysisResult,
        channels: &[Channel],
        today: chrono::NaiveDate,
    ) -> EngineResult<Channel> {
        // A pre-assigned channel is tried before the matcher.
        if let Some(hint) = &item.channel_id {
            match channels.iter().find(|channel| &channel.id == hint) {
                Some(channel) => {
                    if self
                        .stores
                        .ledger
                        .try_reserve(&channel.id, today, channel.daily_quota)
                        .await?
                    {
                        debug!(item_id = %item.id, channel_id = %channel.id, "Hinted channel admitted");
                        return Ok(channel.clone());
                    }
                    debug!(item_id = %item.id, channel_id = %hint, "Hinted channel at quota, falling back to matcher");
                }
                None => {
                    debug!(item_id = %item.id, channel_id = %hint, "Hinted channel not available, falling back to matcher");
                }
            }
        }

        let usage = self.stores.ledger.usage(today).await?;
        let candidates = matcher::rank_candidates(
            analysis,
            channels,
            &usage,
            self.config.fallback_category.as_deref(),
        );

        if candidates.is_empty() {
            return Err(EngineError::permanent(format!(
                "no active channel for category '{}'",
                analysis.category_key()
            )));
        }

        match admission::admit(&candidates, self.stores.ledger.as_ref(), today).await? {
            Some(channel) => Ok(channel),
            None => Err(EngineError::QuotaExhausted),
        }
    }

    /// Active channels with bounded staleness.
    async fn active_channels(&self) -> EngineResult<Vec<Channel>> {
        let mut cached = self.registry_cache.lock().await;

        if let Some(snapshot) = cached.as_ref() {
            if snapshot.fetched_at.elapsed() < self.config.registry_refresh {
                return Ok(snapshot.channels.clone());
            }
        }

        let channels = self.stores.registry.list_active().await?;
        *cached = Some(RegistrySnapshot {
            channels: channels.clone(),
            fetched_at: Instant::now(),
        });

        Ok(channels)
    }
}
