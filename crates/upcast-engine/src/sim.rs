//! Simulated collaborators.
//!
//! Deterministic in-process implementations of the external seams, used by
//! the binary's dry-run mode and by scheduler tests. They exercise the
//! full admission loop without any external service, deriving stable
//! results from the source file name.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use upcast_models::{AnalysisResult, Channel, VideoMetadata};

use crate::external::{Analyzer, CallError, MetadataGenerator, PublishReceipt, Publisher};

const CATEGORIES: &[&str] = &[
    "technology",
    "beauty",
    "fashion",
    "food",
    "gaming",
    "sports",
    "home",
    "kids",
    "pet",
    "travel",
];

const CONTENT_TYPES: &[&str] = &["review", "unboxing", "tutorial", "comparison", "haul"];

fn file_name(source_path: &str) -> String {
    source_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_path)
        .to_lowercase()
}

/// Analyzer deriving a deterministic result from the file name.
pub struct SimAnalyzer;

#[async_trait]
impl Analyzer for SimAnalyzer {
    async fn analyze(&self, source_path: &str) -> Result<AnalysisResult, CallError> {
        let name = file_name(source_path);

        let category = CATEGORIES
            .iter()
            .find(|category| name.contains(*category))
            .copied()
            .unwrap_or("lifestyle");
        let content_type = CONTENT_TYPES
            .iter()
            .find(|content_type| name.contains(*content_type))
            .copied()
            .unwrap_or("review");
        let keywords: Vec<String> = name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|word| word.len() > 2)
            .take(5)
            .map(String::from)
            .collect();

        Ok(AnalysisResult {
            category: category.to_string(),
            content_type: content_type.to_string(),
            keywords,
            products: vec![],
            confidence: 0.9,
        })
    }
}

/// Metadata generator composing title, description and tags from the
/// analysis and the target channel.
pub struct SimMetadataGenerator;

#[async_trait]
impl MetadataGenerator for SimMetadataGenerator {
    async fn generate(
        &self,
        analysis: &AnalysisResult,
        channel: &Channel,
    ) -> Result<VideoMetadata, CallError> {
        let headline = analysis
            .keywords
            .first()
            .cloned()
            .unwrap_or_else(|| analysis.category.clone());

        let mut tags = analysis.keywords.clone();
        tags.push(analysis.category.clone());
        tags.dedup();

        Ok(VideoMetadata {
            title: format!("{} {} | {}", headline, analysis.content_type, channel.name),
            description: format!(
                "A {} about {}. Keywords: {}",
                analysis.content_type,
                analysis.category,
                analysis.keywords.join(", ")
            ),
            tags,
        })
    }
}

/// Publisher that pretends the upload happened.
pub struct SimPublisher;

#[async_trait]
impl Publisher for SimPublisher {
    async fn publish(
        &self,
        channel: &Channel,
        source_path: &str,
        metadata: &VideoMetadata,
    ) -> Result<PublishReceipt, CallError> {
        // Stand in for the real upload latency
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let publish_ref = format!("sim-{}", Uuid::new_v4().simple());
        info!(
            channel_id = %channel.id,
            source_path,
            title = %metadata.title,
            publish_ref = %publish_ref,
            "Simulated publish"
        );

        Ok(PublishReceipt {
            url: Some(format!("https://videos.example/watch/{}", publish_ref)),
            publish_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upcast_models::ChannelKind;

    #[tokio::test]
    async fn test_sim_analyzer_is_deterministic() {
        let first = SimAnalyzer
            .analyze("/videos/gaming_keyboard_review.mp4")
            .await
            .unwrap();
        let second = SimAnalyzer
            .analyze("/videos/gaming_keyboard_review.mp4")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.category, "gaming");
        assert_eq!(first.content_type, "review");
        assert!(first.keywords.contains(&"keyboard".to_string()));
    }

    #[tokio::test]
    async fn test_sim_analyzer_falls_back_to_lifestyle() {
        let analysis = SimAnalyzer.analyze("/videos/clip0001.mp4").await.unwrap();
        assert_eq!(analysis.category, "lifestyle");
    }

    #[tokio::test]
    async fn test_sim_generator_includes_channel_name() {
        let analysis = SimAnalyzer
            .analyze("/videos/beauty_serum_unboxing.mp4")
            .await
            .unwrap();
        let channel = Channel::new("ch-1", "Glow Lab", "beauty", ChannelKind::Primary, 3);

        let metadata = SimMetadataGenerator
            .generate(&analysis, &channel)
            .await
            .unwrap();
        assert!(metadata.title.contains("Glow Lab"));
        assert!(metadata.tags.contains(&"beauty".to_string()));
    }

    #[tokio::test]
    async fn test_sim_publisher_refs_are_unique() {
        let channel = Channel::new("ch-1", "Main", "tech", ChannelKind::Primary, 3);
        let metadata = VideoMetadata {
            title: "t".into(),
            description: "d".into(),
            tags: vec![],
        };

        let a = SimPublisher
            .publish(&channel, "/v/a.mp4", &metadata)
            .await
            .unwrap();
        let b = SimPublisher
            .publish(&channel, "/v/a.mp4", &metadata)
            .await
            .unwrap();
        assert_ne!(a.publish_ref, b.publish_ref);
    }
}
