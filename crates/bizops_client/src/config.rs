use crate::BizError;
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 45;

#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    /// Pre-issued bearer token for the backend, if it requires one.
    pub api_token: Option<SecretString>,
    pub llm: LlmConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Read replies as NDJSON chunks instead of one body.
    pub stream: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE.into(),
            model: DEFAULT_OLLAMA_MODEL.into(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            stream: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, BizError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, BizError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = get("BIZOPS_API_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BizError::Config("BIZOPS_API_BASE_URL missing".into()))?;
        let api_token = get("BIZOPS_API_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .map(|t| SecretString::new(t.into()));

        let llm_base = get("OLLAMA_BASE").unwrap_or_else(|| DEFAULT_OLLAMA_BASE.into());
        let model = get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into());
        let timeout_secs = match get("BIZOPS_LLM_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                BizError::Config(format!("BIZOPS_LLM_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };
        let stream = get("OLLAMA_STREAM")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            base_url,
            api_token,
            llm: LlmConfig {
                base_url: llm_base,
                model,
                timeout: Duration::from_secs(timeout_secs),
                stream,
            },
        })
    }
}
