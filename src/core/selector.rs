//! Model tier selection

use std::fmt;

use serde::{Deserialize, Serialize};

use super::classifier::{ComplexityLevel, TopicCategory};

/// Messages longer than this many characters always go to the capable tier.
pub const LONG_MESSAGE_CHARS: usize = 100;

/// Topics that always go to the capable tier
const CAPABLE_TOPICS: &[TopicCategory] = &[
    TopicCategory::SystemDesign,
    TopicCategory::AiMl,
    TopicCategory::Architecture,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap, low-latency model
    Fast,
    /// More capable, more expensive model
    Capable,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Capable => "capable",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which selection rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    LongMessage,
    AdvancedLevel,
    CapableTopic,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSelection {
    pub tier: ModelTier,
    pub reason: SelectionReason,
}

/// Pick a tier. Rules are checked in order; the first that holds decides.
pub fn select(message: &str, level: ComplexityLevel, topic: TopicCategory) -> TierSelection {
    let (tier, reason) = if message.chars().count() > LONG_MESSAGE_CHARS {
        (ModelTier::Capable, SelectionReason::LongMessage)
    } else if level == ComplexityLevel::Advanced {
        (ModelTier::Capable, SelectionReason::AdvancedLevel)
    } else if CAPABLE_TOPICS.contains(&topic) {
        (ModelTier::Capable, SelectionReason::CapableTopic)
    } else {
        (ModelTier::Fast, SelectionReason::Default)
    };

    TierSelection { tier, reason }
}

/// Concrete model names for each tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierModels {
    pub fast: String,
    pub capable: String,
}

impl TierModels {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Capable => &self.capable,
        }
    }
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            fast: "gpt-4o-mini".to_string(),
            capable: "gpt-4o".to_string(),
        }
    }
}
