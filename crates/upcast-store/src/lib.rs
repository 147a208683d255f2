//! Storage layer for the Upcast scheduling engine.
//!
//! This crate provides:
//! - Capability traits for the upload queue, quota ledger, channel
//!   registry, analysis cache and upload history
//! - An in-memory backend implementing all of them
//! - Redis backends for the state shared across worker processes
//!   (quota ledger, analysis cache)
//!
//! The two operations the backing store must make atomic are
//! [`QueueStore::claim_next`] and [`QuotaLedger::try_reserve`]; both are
//! expressed as conditional updates so no application-level lock is ever
//! held across an external call.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::{RedisAnalysisCache, RedisQuotaLedger, RedisStoreConfig};
pub use traits::{AnalysisCache, ChannelRegistry, HistoryStore, QueueStore, QuotaLedger};
