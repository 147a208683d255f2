//! Queue priority scoring.
//!
//! Priority is a 0-100 score, higher is sooner. Items enqueued before
//! analysis start at the base priority; ingestion callers that already hold
//! an analysis result can score it here.

use crate::analysis::AnalysisResult;

/// Base priority assigned when nothing is known about the content.
pub const DEFAULT_PRIORITY: u8 = 50;

/// Score a queue priority from an analysis result.
///
/// Base 50, boosted by analyzer confidence and by categories and content
/// types that historically perform well, capped at 100.
pub fn priority_for(analysis: &AnalysisResult) -> u8 {
    let mut priority = DEFAULT_PRIORITY as i32;

    let confidence = analysis.confidence.clamp(0.0, 1.0);
    priority += (confidence * 20.0).round() as i32;

    priority += match analysis.category_key().as_str() {
        "technology" => 10,
        "beauty" => 8,
        "gaming" => 7,
        "fashion" => 6,
        "food" => 5,
        _ => 0,
    };

    priority += match analysis.content_type.to_lowercase().as_str() {
        "review" => 10,
        "unboxing" => 8,
        "comparison" => 7,
        "tutorial" => 5,
        "haul" => 4,
        _ => 0,
    };

    priority.min(100) as u8
}
