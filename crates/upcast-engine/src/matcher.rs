//! Channel matching.
//!
//! A pure function over snapshots: given an analysis result, the channel
//! catalog and today's quota usage, produce the ranked list of candidates
//! for admission. Determinism matters here; identical inputs must produce
//! the identical ranking so admission decisions are reproducible.

use std::collections::HashMap;

use upcast_models::{AnalysisResult, Channel, ChannelKind};

/// A candidate channel with its remaining quota at ranking time.
///
/// The remaining count is advisory; the atomic reservation in the ledger
/// is the true admission gate.
#[derive(Debug, Clone)]
pub struct RankedChannel {
    pub channel: Channel,
    pub remaining: u32,
}

/// Rank eligible channels for an analysis result.
///
/// Candidates are the active channels matching the detected category;
/// when none match and a fallback category is configured, the fallback is
/// tried instead. An empty result means no eligible channel exists at all
/// (a permanent condition for the item, decided by the caller).
///
/// Ranking: remaining quota descending, primary before secondary, then
/// channel id for a deterministic final tie-break. Full channels stay in
/// the list and sort last; the ledger rejects them if the snapshot was
/// stale.
pub fn rank_candidates(
    analysis: &AnalysisResult,
    channels: &[Channel],
    usage: &HashMap<String, u32>,
    fallback_category: Option<&str>,
) -> Vec<RankedChannel> {
    let category = analysis.category_key();

    let mut eligible = eligible_for_category(channels, &category);
    if eligible.is_empty() {
        if let Some(fallback) = fallback_category {
            eligible = eligible_for_category(channels, fallback);
        }
    }

    let mut ranked: Vec<RankedChannel> = eligible
        .into_iter()
        .map(|channel| {
            let used = usage.get(&channel.id).copied().unwrap_or(0);
            let remaining = channel.daily_quota.saturating_sub(used);
            RankedChannel {
                channel: channel.clone(),
                remaining,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.remaining
            .cmp(&a.remaining)
            .then_with(|| kind_rank(a.channel.kind).cmp(&kind_rank(b.channel.kind)))
            .then_with(|| a.channel.id.cmp(&b.channel.id))
    });

    ranked
}

fn eligible_for_category<'a>(channels: &'a [Channel], category: &str) -> Vec<&'a Channel> {
    channels
        .iter()
        .filter(|channel| channel.active && channel.matches_category(category))
        .collect()
}

fn kind_rank(kind: ChannelKind) -> u8 {
    match kind {
        ChannelKind::Primary => 0,
        ChannelKind::Secondary => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(category: &str) -> AnalysisResult {
        AnalysisResult {
            category: category.into(),
            content_type: "review".into(),
            keywords: vec![],
            products: vec![],
            confidence: 0.9,
        }
    }

    fn channel(id: &str, category: &str, kind: ChannelKind, quota: u32) -> Channel {
        Channel::new(id, id, category, kind, quota)
    }

    fn ids(ranked: &[RankedChannel]) -> Vec<&str> {
        ranked.iter().map(|r| r.channel.id.as_str()).collect()
    }

    #[test]
    fn test_ranking_prefers_remaining_quota() {
        let channels = vec![
            channel("ch-a", "tech", ChannelKind::Primary, 3),
            channel("ch-b", "tech", ChannelKind::Primary, 5),
        ];
        let mut usage = HashMap::new();
        usage.insert("ch-b".to_string(), 1);

        // ch-b has 4 remaining, ch-a has 3
        let ranked = rank_candidates(&analysis("tech"), &channels, &usage, None);
        assert_eq!(ids(&ranked), vec!["ch-b", "ch-a"]);
    }

    #[test]
    fn test_primary_breaks_remaining_tie() {
        let channels = vec![
            channel("ch-a", "tech", ChannelKind::Secondary, 3),
            channel("ch-b", "tech", ChannelKind::Primary, 3),
        ];
        let ranked = rank_candidates(&analysis("tech"), &channels, &HashMap::new(), None);
        assert_eq!(ids(&ranked), vec!["ch-b", "ch-a"]);
    }

    #[test]
    fn test_id_is_final_tie_break() {
        let channels = vec![
            channel("ch-b", "tech", ChannelKind::Primary, 3),
            channel("ch-a", "tech", ChannelKind::Primary, 3),
        ];
        let ranked = rank_candidates(&analysis("tech"), &channels, &HashMap::new(), None);
        assert_eq!(ids(&ranked), vec!["ch-a", "ch-b"]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let channels = vec![
            channel("ch-c", "tech", ChannelKind::Secondary, 2),
            channel("ch-a", "tech", ChannelKind::Primary, 3),
            channel("ch-b", "tech", ChannelKind::Primary, 3),
        ];
        let mut usage = HashMap::new();
        usage.insert("ch-a".to_string(), 2);

        let first = ids(&rank_candidates(&analysis("tech"), &channels, &usage, None))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        for _ in 0..10 {
            let again = ids(&rank_candidates(&analysis("tech"), &channels, &usage, None))
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_inactive_channels_excluded() {
        let mut inactive = channel("ch-a", "tech", ChannelKind::Primary, 3);
        inactive.active = false;
        let channels = vec![inactive, channel("ch-b", "tech", ChannelKind::Primary, 3)];

        let ranked = rank_candidates(&analysis("tech"), &channels, &HashMap::new(), None);
        assert_eq!(ids(&ranked), vec!["ch-b"]);
    }

    #[test]
    fn test_fallback_category_when_no_direct_match() {
        let channels = vec![channel("ch-a", "lifestyle", ChannelKind::Primary, 3)];

        let none = rank_candidates(&analysis("tech"), &channels, &HashMap::new(), None);
        assert!(none.is_empty());

        let fallback =
            rank_candidates(&analysis("tech"), &channels, &HashMap::new(), Some("lifestyle"));
        assert_eq!(ids(&fallback), vec!["ch-a"]);
    }

    #[test]
    fn test_category_match_is_case_insensitive() {
        let channels = vec![channel("ch-a", "tech", ChannelKind::Primary, 3)];
        let ranked = rank_candidates(&analysis("TECH"), &channels, &HashMap::new(), None);
        assert_eq!(ids(&ranked), vec!["ch-a"]);
    }

    #[test]
    fn test_full_channels_rank_last_but_stay_listed() {
        let channels = vec![
            channel("ch-a", "tech", ChannelKind::Primary, 3),
            channel("ch-b", "tech", ChannelKind::Primary, 3),
        ];
        let mut usage = HashMap::new();
        usage.insert("ch-a".to_string(), 3);

        let ranked = rank_candidates(&analysis("tech"), &channels, &usage, None);
        assert_eq!(ids(&ranked), vec!["ch-b", "ch-a"]);
        assert_eq!(ranked[1].remaining, 0);
    }
}
