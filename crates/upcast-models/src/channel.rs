//! Publishing channel catalog types.
//!
//! Channels are created and edited by an external admin path; the engine
//! only reads them when matching and admitting queue items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a channel in the two-level channel hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Main channel, preferred at equal remaining quota
    #[default]
    Primary,
    /// Sub channel, optionally attached to a primary parent
    Secondary,
}

impl ChannelKind {
    /// Get string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Primary => "primary",
            ChannelKind::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A managed publishing channel.
///
/// `parent_id` may only be set on a [`ChannelKind::Secondary`] channel and
/// must reference a primary; the reference depth is capped at one level.
/// The registry validates both constraints at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Operator-assigned channel identifier
    pub id: String,
    /// Human-readable channel name
    pub name: String,
    /// Lower-case content category this channel publishes
    pub category: String,
    /// Hierarchy kind
    pub kind: ChannelKind,
    /// Parent channel id (secondary channels only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Maximum admissions per calendar day (always > 0)
    pub daily_quota: u32,
    /// Inactive channels are never offered by the matcher
    pub active: bool,
    /// When the channel was registered
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Create a new active channel with no parent.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        kind: ChannelKind,
        daily_quota: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into().to_lowercase(),
            kind,
            parent_id: None,
            daily_quota,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Attach a parent channel reference.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Case-insensitive category comparison.
    pub fn matches_category(&self, category: &str) -> bool {
        self.category.eq_ignore_ascii_case(category.trim())
    }
}
