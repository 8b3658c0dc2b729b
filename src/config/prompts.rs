//! Base prompt templates
//!
//! The mentor's base instruction text can be replaced by a TOML template file.
//! The per-turn context block is appended on top of it by the prompt composer.
//!
//! # Example Prompt File
//!
//! ```toml
//! [persona]
//! name = "Staff Engineer"
//! description = "Pragmatic mentor for a backend team"
//!
//! [system_prompt]
//! content = """
//! You are a staff engineer mentoring backend developers...
//! """
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// A persona/prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Persona metadata
    pub persona: PersonaInfo,

    /// The system prompt
    pub system_prompt: SystemPrompt,
}

/// Persona metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    /// Display name of the persona
    pub name: String,

    /// Brief description
    #[serde(default)]
    pub description: String,
}

/// System prompt content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// The full system prompt content
    pub content: String,
}

impl PromptTemplate {
    /// Load a template from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let template: PromptTemplate =
            toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))?;

        if template.system_prompt.content.trim().is_empty() {
            return Err(PromptError::Empty(template.persona.name));
        }
        Ok(template)
    }
}

/// Errors from prompt loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Prompt '{0}' has an empty system prompt")]
    Empty(String),
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// Default software-engineering mentor prompt
    pub const MENTOR: &str = r#"You are an experienced software engineer and mentor. You answer questions about software architecture, algorithms, design patterns, system design, AI/ML, DevOps, web development, and engineering best practices.

When answering:
1. Start with a direct answer to the question
2. Explain the reasoning behind it at the reader's level
3. Point out common mistakes and trade-offs
4. Suggest what to learn or try next when it helps

Be accurate and concise. If a question is ambiguous, state the assumption you are making."#;
}
