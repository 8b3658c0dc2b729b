//! Application configuration

pub mod prompts;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TierModels;

pub use prompts::{builtin as prompts_builtin, PromptError, PromptTemplate};

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/mentor.db";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// Which completion provider to talk to and how to authenticate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// "openai", "groq", or "local"
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub provider: ProviderSettings,
    pub models: TierModels,
    pub upstream_timeout_secs: u64,
    pub database_url: String,
    pub prompt_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider_name = lookup("MENTOR_PROVIDER").unwrap_or_else(|| "openai".into());
        let api_key = match provider_name.to_lowercase().as_str() {
            "openai" => Some(require(&lookup, "OPENAI_API_KEY")?),
            "groq" => Some(require(&lookup, "GROQ_API_KEY")?),
            "local" => {
                require(&lookup, "MENTOR_BASE_URL")?;
                None
            }
            other => {
                return Err(ConfigError::Invalid {
                    key: "MENTOR_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        let defaults = TierModels::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse_or(&lookup, "PORT", 3000)?,
            provider: ProviderSettings {
                name: provider_name,
                api_key,
                base_url: lookup("MENTOR_BASE_URL"),
            },
            models: TierModels {
                fast: lookup("MENTOR_FAST_MODEL").unwrap_or(defaults.fast),
                capable: lookup("MENTOR_CAPABLE_MODEL").unwrap_or(defaults.capable),
            },
            upstream_timeout_secs: parse_or(
                &lookup,
                "MENTOR_UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            prompt_file: lookup("MENTOR_PROMPT_FILE").map(PathBuf::from),
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Base system prompt: the template file if configured, otherwise the built-in one
    pub async fn base_prompt(&self) -> Result<String, ConfigError> {
        match &self.prompt_file {
            Some(path) => {
                let template = PromptTemplate::load_from_file(path).await?;
                tracing::info!("Loaded prompt template '{}'", template.persona.name);
                Ok(template.system_prompt.content)
            }
            None => Ok(prompts_builtin::MENTOR.to_string()),
        }
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Prompt template error: {0}")]
    Prompt(#[from] PromptError),
}
