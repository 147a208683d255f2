//! Quota admission.
//!
//! Admission walks the matcher's ranked list and claims the first channel
//! whose atomic increment-if-below-limit succeeds. The ledger is the only
//! serialization point; a stale ranking just means a candidate rejects
//! the reservation and the walk moves on.

use chrono::NaiveDate;
use tracing::debug;

use upcast_models::Channel;
use upcast_store::QuotaLedger;

use crate::error::EngineResult;
use crate::matcher::RankedChannel;

/// Try to reserve a slot on each candidate in ranked order.
///
/// Returns the admitted channel, or `None` when every candidate was at
/// quota; the caller treats `None` as the recoverable quota-exhausted
/// condition, never as an item failure.
pub async fn admit(
    candidates: &[RankedChannel],
    ledger: &dyn QuotaLedger,
    day: NaiveDate,
) -> EngineResult<Option<Channel>> {
    for candidate in candidates {
        let channel = &candidate.channel;
        if ledger
            .try_reserve(&channel.id, day, channel.daily_quota)
            .await?
        {
            debug!(channel_id = %channel.id, day = %day, "Quota slot reserved");
            return Ok(Some(channel.clone()));
        }
        debug!(channel_id = %channel.id, day = %day, "Channel at quota, trying next candidate");
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use upcast_models::{AnalysisResult, Channel, ChannelKind};
    use upcast_store::MemoryStore;

    fn ranked(channels: Vec<Channel>) -> Vec<RankedChannel> {
        let analysis = AnalysisResult {
            category: "tech".into(),
            content_type: "review".into(),
            keywords: vec![],
            products: vec![],
            confidence: 0.9,
        };
        crate::matcher::rank_candidates(
            &analysis,
            &channels,
            &std::collections::HashMap::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_first_open_candidate_wins() {
        let store = MemoryStore::new();
        let day = Utc::now().date_naive();

        let a = Channel::new("ch-a", "A", "tech", ChannelKind::Primary, 1);
        let b = Channel::new("ch-b", "B", "tech", ChannelKind::Primary, 1);
        let candidates = ranked(vec![a, b]);

        let first = admit(&candidates, &store, day).await.unwrap().unwrap();
        assert_eq!(first.id, "ch-a");

        // ch-a is now full; admission falls through to ch-b
        let second = admit(&candidates, &store, day).await.unwrap().unwrap();
        assert_eq!(second.id, "ch-b");

        // Everything full: recoverable, not an error
        let third = admit(&candidates, &store, day).await.unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let store = MemoryStore::new();
        let day = Utc::now().date_naive();
        assert!(admit(&[], &store, day).await.unwrap().is_none());
    }
}
