//! Built-in intent heuristics.

use modelmux_types::models::ModelTier;

use crate::proxy::intent::{
    INTENT_AUDIO, INTENT_CODE, INTENT_DEFAULT, INTENT_LONG, INTENT_SUMMARIZE, INTENT_TRANSLATE,
    INTENT_VISION,
};

/// Model choice for a heuristic candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicModel {
    Tier(ModelTier),
    Fixed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicPair {
    /// Provider base name
    pub base: &'static str,
    pub model: HeuristicModel,
}

const fn tier(base: &'static str, tier: ModelTier) -> HeuristicPair {
    HeuristicPair { base, model: HeuristicModel::Tier(tier) }
}

const fn fixed(base: &'static str, model: &'static str) -> HeuristicPair {
    HeuristicPair { base, model: HeuristicModel::Fixed(model) }
}

const STRONG_PAIRS: &[HeuristicPair] =
    &[tier("openai", ModelTier::Strong), tier("groq", ModelTier::Strong)];
const FAST_PAIRS: &[HeuristicPair] = &[tier("openai", ModelTier::Fast), tier("groq", ModelTier::Fast)];
const VISION_PAIRS: &[HeuristicPair] = &[tier("openai", ModelTier::Strong)];
const AUDIO_PAIRS: &[HeuristicPair] = &[fixed("openai", "whisper-1"), fixed("groq", "whisper-large-v3")];
const DEFAULT_PAIRS: &[HeuristicPair] =
    &[tier("groq", ModelTier::Fast), tier("openai", ModelTier::Fast)];

/// Ordered candidate pairs for an intent. Unknown intents have none.
pub fn heuristic_pairs(intent: &str) -> &'static [HeuristicPair] {
    match intent {
        INTENT_CODE | INTENT_LONG => STRONG_PAIRS,
        INTENT_TRANSLATE | INTENT_SUMMARIZE => FAST_PAIRS,
        INTENT_VISION => VISION_PAIRS,
        INTENT_AUDIO => AUDIO_PAIRS,
        INTENT_DEFAULT => DEFAULT_PAIRS,
        _ => &[],
    }
}
