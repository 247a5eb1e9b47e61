use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EvalError;

mod judge_internal;
pub mod local;

pub use judge_internal::client::HttpJudge;
pub use local::LocalJudge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    Grok,
    Ollama,
    Local,
}

impl JudgeProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JudgeProviderKind::OpenAi => "openai",
            JudgeProviderKind::Anthropic => "anthropic",
            JudgeProviderKind::Gemini => "gemini",
            JudgeProviderKind::Grok => "grok",
            JudgeProviderKind::Ollama => "ollama",
            JudgeProviderKind::Local => "local",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            JudgeProviderKind::OpenAi => "gpt-4o-mini",
            JudgeProviderKind::Anthropic => "claude-3-5-haiku-latest",
            JudgeProviderKind::Gemini => "gemini-1.5-flash",
            JudgeProviderKind::Grok => "grok-2-latest",
            JudgeProviderKind::Ollama => "llama3.1",
            JudgeProviderKind::Local => "rubric-terms",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            JudgeProviderKind::OpenAi => "https://api.openai.com/v1",
            JudgeProviderKind::Anthropic => "https://api.anthropic.com/v1",
            JudgeProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            JudgeProviderKind::Grok => "https://api.x.ai/v1",
            JudgeProviderKind::Ollama => "http://localhost:11434",
            JudgeProviderKind::Local => "",
        }
    }

    /// Environment variable holding the API key, for providers that need one.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            JudgeProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            JudgeProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            JudgeProviderKind::Gemini => Some("GEMINI_API_KEY"),
            JudgeProviderKind::Grok => Some("XAI_API_KEY"),
            JudgeProviderKind::Ollama | JudgeProviderKind::Local => None,
        }
    }
}

impl FromStr for JudgeProviderKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "grok" | "xai" => Ok(Self::Grok),
            "ollama" => Ok(Self::Ollama),
            "local" => Ok(Self::Local),
            other => Err(EvalError::config(format!(
                "unknown judge provider '{}' (expected one of: openai, anthropic, gemini, grok, ollama, local)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for JudgeProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit judge configuration. Nothing here is read from the process environment unless
/// [`JudgeConfig::resolve_api_key_from_env`] is called.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub provider: JudgeProviderKind,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl JudgeConfig {
    pub fn new(provider: JudgeProviderKind) -> Self {
        Self {
            provider,
            model: None,
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(30),
            temperature: 0.0,
            max_tokens: 800,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fill `api_key` from the provider's environment variable if it is not already set.
    pub fn resolve_api_key_from_env(mut self) -> Self {
        if self.api_key.is_none() {
            if let Some(var) = self.provider.api_key_env() {
                self.api_key = std::env::var(var).ok().filter(|k| !k.trim().is_empty());
            }
        }
        self
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn build(&self) -> Result<Arc<dyn JudgeProvider>, EvalError> {
        match self.provider {
            JudgeProviderKind::Local => Ok(Arc::new(LocalJudge::new())),
            _ => Ok(Arc::new(HttpJudge::from_config(self)?)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub query: &'a str,
    pub output: &'a str,
    pub rubric: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeScore {
    /// Clamped to 0..=100.
    pub score: f64,
    pub rationale: String,
}

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("judge call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid judge response: {message}")]
    InvalidResponse { message: String },

    #[error("judge misconfigured: {message}")]
    Config { message: String },
}

impl JudgeError {
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Transport { .. } | JudgeError::Timeout { .. } => true,
            JudgeError::Status { status, .. } => *status == 429 || *status >= 500,
            JudgeError::InvalidResponse { .. } | JudgeError::Config { .. } => false,
        }
    }
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            JudgeError::Timeout { after_ms: 0 }
        } else {
            JudgeError::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// A semantic scorer. Implementations are stateless per call.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeScore, JudgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn provider_kind_round_trip_names() {
        for kind in [
            JudgeProviderKind::OpenAi,
            JudgeProviderKind::Anthropic,
            JudgeProviderKind::Gemini,
            JudgeProviderKind::Grok,
            JudgeProviderKind::Ollama,
            JudgeProviderKind::Local,
        ] {
            assert_eq!(kind.as_str().parse::<JudgeProviderKind>().unwrap(), kind);
        }
        assert!("bard".parse::<JudgeProviderKind>().is_err());
    }

    #[test]
    fn transient_classification() {
        assert!(JudgeError::Status { status: 429, body: String::new() }.is_transient());
        assert!(JudgeError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!JudgeError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!JudgeError::InvalidResponse { message: "x".into() }.is_transient());
        assert!(JudgeError::Timeout { after_ms: 5 }.is_transient());
    }

    #[test]
    #[serial]
    fn api_key_resolved_only_on_request() {
        std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
        let cfg = JudgeConfig::new(JudgeProviderKind::Anthropic);
        assert!(cfg.api_key.is_none());
        let cfg = cfg.resolve_api_key_from_env();
        assert_eq!(cfg.api_key.as_deref(), Some("sk-ant-test"));

        let explicit = JudgeConfig::new(JudgeProviderKind::Anthropic)
            .with_api_key("explicit")
            .resolve_api_key_from_env();
        assert_eq!(explicit.api_key.as_deref(), Some("explicit"));
        std::env::remove_var("ANTHROPIC_API_KEY");
    }

    #[test]
    #[serial]
    fn hosted_provider_without_key_is_config_error() {
        std::env::remove_var("OPENAI_API_KEY");
        let err = JudgeConfig::new(JudgeProviderKind::OpenAi)
            .resolve_api_key_from_env()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, EvalError::Config { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn ollama_and_local_need_no_key() {
        assert!(JudgeConfig::new(JudgeProviderKind::Ollama).build().is_ok());
        let local = JudgeConfig::new(JudgeProviderKind::Local).build().unwrap();
        assert_eq!(local.name(), "local");
    }
}
