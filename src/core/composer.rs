//! System prompt composition

use super::classifier::{ComplexityLevel, TopicCategory};

fn level_guidance(level: ComplexityLevel) -> &'static str {
    match level {
        ComplexityLevel::Beginner => {
            "assume little prior knowledge, define terms, and prefer analogies over jargon"
        }
        ComplexityLevel::Intermediate => {
            "assume working familiarity with programming and focus on practical understanding"
        }
        ComplexityLevel::Advanced => {
            "assume deep experience, cover edge cases and trade-offs, and skip introductory material"
        }
    }
}

/// Append the per-turn context block to the base instruction text.
///
/// Output depends only on the arguments. Nothing is truncated.
pub fn compose(
    base_prompt: &str,
    topic: TopicCategory,
    level: ComplexityLevel,
    include_code: bool,
) -> String {
    let code = if include_code {
        "required - include complete, runnable code examples"
    } else {
        "not required - only include code if it clarifies the explanation"
    };

    format!(
        "{}\n\n## Current Context\n\n\
        - Topic: {} ({})\n\
        - Level: {} ({})\n\
        - Code examples: {}",
        base_prompt.trim_end(),
        topic,
        topic.focus(),
        level,
        level_guidance(level),
        code
    )
}
