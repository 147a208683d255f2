//! Scheduling engine binary.
//!
//! Runs the scheduler loop against the in-memory store with the simulated
//! collaborators: a dry-run deployment for exercising admission behavior.
//! The channel registry and (optionally) the queue are seeded from JSON
//! files named by environment variables.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use upcast_engine::sim::{SimAnalyzer, SimMetadataGenerator, SimPublisher};
use upcast_engine::{Collaborators, EngineConfig, EngineStats, EngineStores, Scheduler};
use upcast_models::{Channel, NewQueueItem};
use upcast_store::{ChannelRegistry, MemoryStore, QueueStore};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("upcast=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting upcast-engine");

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let store = Arc::new(MemoryStore::new());
    let stores = EngineStores::memory(store);

    match std::env::var("UPCAST_CHANNELS_FILE") {
        Ok(path) => match load_channels(&path, stores.registry.as_ref()).await {
            Ok(count) => info!(count, path = %path, "Seeded channel registry"),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to seed channel registry");
                std::process::exit(1);
            }
        },
        Err(_) => {
            warn!("UPCAST_CHANNELS_FILE not set; channel registry is empty");
        }
    }

    if let Ok(path) = std::env::var("UPCAST_SEED_QUEUE_FILE") {
        match seed_queue(&path, stores.queue.as_ref()).await {
            Ok(count) => info!(count, path = %path, "Seeded upload queue"),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to seed upload queue");
                std::process::exit(1);
            }
        }
    }

    let collaborators = Collaborators {
        analyzer: Arc::new(SimAnalyzer),
        generator: Arc::new(SimMetadataGenerator),
        publisher: Arc::new(SimPublisher),
    };

    let scheduler = Arc::new(Scheduler::new(config, stores.clone(), collaborators));

    // Periodic statistics, mirroring what a dashboard would poll
    let stats_interval = std::env::var("UPCAST_STATS_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300);
    let stats_stores = stores.clone();
    let stats_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
        loop {
            interval.tick().await;
            match EngineStats::snapshot(&stats_stores).await {
                Ok(stats) => match serde_json::to_string(&stats) {
                    Ok(json) => info!(stats = %json, "Engine statistics"),
                    Err(e) => warn!(error = %e, "Failed to serialize statistics"),
                },
                Err(e) => warn!(error = %e, "Failed to collect statistics"),
            }
        }
    });

    // Setup signal handler
    let shutdown_scheduler = Arc::clone(&scheduler);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_scheduler.shutdown();
    });

    scheduler.run().await;

    stats_task.abort();
    info!("Engine shutdown complete");
}

/// Load a JSON array of channels into the registry.
async fn load_channels(
    path: &str,
    registry: &dyn ChannelRegistry,
) -> Result<usize, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let channels: Vec<Channel> = serde_json::from_str(&raw)?;
    let count = channels.len();
    for channel in channels {
        registry.upsert(channel).await?;
    }
    Ok(count)
}

/// Load a JSON array of enqueue requests into the queue.
async fn seed_queue(
    path: &str,
    queue: &dyn QueueStore,
) -> Result<usize, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let requests: Vec<NewQueueItem> = serde_json::from_str(&raw)?;
    let count = requests.len();
    for request in requests {
        queue.enqueue(request).await?;
    }
    Ok(count)
}
