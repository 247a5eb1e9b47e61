use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::parse::extract_score;
use super::prompt::{build_prompt, SYSTEM_PROMPT};
use crate::errors::EvalError;
use crate::judge::{JudgeConfig, JudgeError, JudgeProvider, JudgeProviderKind, JudgeRequest, JudgeScore};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ERROR_BODY: usize = 500;

/// Judge backed by a hosted or local LLM HTTP API.
#[derive(Debug, Clone)]
pub struct HttpJudge {
    kind: JudgeProviderKind,
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl HttpJudge {
    pub fn from_config(config: &JudgeConfig) -> Result<Self, EvalError> {
        if config.provider == JudgeProviderKind::Local {
            return Err(EvalError::config("the local judge has no HTTP client"));
        }
        if let Some(var) = config.provider.api_key_env() {
            if config.api_key.is_none() {
                return Err(EvalError::config(format!(
                    "judge provider '{}' needs an API key (set {})",
                    config.provider, var
                )));
            }
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EvalError::config(format!("failed to build judge HTTP client: {}", e)))?;
        Ok(Self {
            kind: config.provider,
            model: config.model_name().to_string(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| config.provider.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_ms: u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_http(&self, prompt: &str) -> reqwest::RequestBuilder {
        let key = self.api_key.as_deref().unwrap_or_default();
        match self.kind {
            JudgeProviderKind::OpenAi | JudgeProviderKind::Grok => self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(key)
                .json(&json!({
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": SYSTEM_PROMPT},
                        {"role": "user", "content": prompt}
                    ],
                    "temperature": self.temperature,
                    "max_tokens": self.max_tokens,
                })),
            JudgeProviderKind::Anthropic => self
                .client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.model,
                    "system": SYSTEM_PROMPT,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": self.temperature,
                    "max_tokens": self.max_tokens,
                })),
            JudgeProviderKind::Gemini => self
                .client
                .post(format!(
                    "{}/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .header("x-goog-api-key", key)
                .json(&json!({
                    "systemInstruction": {"parts": [{"text": SYSTEM_PROMPT}]},
                    "contents": [{"role": "user", "parts": [{"text": prompt}]}],
                    "generationConfig": {
                        "temperature": self.temperature,
                        "maxOutputTokens": self.max_tokens,
                    },
                })),
            JudgeProviderKind::Ollama | JudgeProviderKind::Local => self
                .client
                .post(format!("{}/api/chat", self.base_url))
                .json(&json!({
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": SYSTEM_PROMPT},
                        {"role": "user", "content": prompt}
                    ],
                    "stream": false,
                    "options": {"temperature": self.temperature},
                })),
        }
    }

    fn text_pointer(&self) -> &'static str {
        match self.kind {
            JudgeProviderKind::OpenAi | JudgeProviderKind::Grok => "/choices/0/message/content",
            JudgeProviderKind::Anthropic => "/content/0/text",
            JudgeProviderKind::Gemini => "/candidates/0/content/parts/0/text",
            JudgeProviderKind::Ollama | JudgeProviderKind::Local => "/message/content",
        }
    }
}

#[async_trait]
impl JudgeProvider for HttpJudge {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeScore, JudgeError> {
        let prompt = build_prompt(request);
        debug!(provider = self.kind.as_str(), model = %self.model, "calling judge");

        let resp = self.build_http(&prompt).send().await.map_err(|e| {
            if e.is_timeout() {
                JudgeError::Timeout {
                    after_ms: self.timeout_ms,
                }
            } else {
                JudgeError::from(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp.json().await.map_err(|e| JudgeError::InvalidResponse {
            message: format!("provider body is not JSON: {}", e),
        })?;
        let text = json
            .pointer(self.text_pointer())
            .and_then(Value::as_str)
            .ok_or_else(|| JudgeError::InvalidResponse {
                message: format!("no text at {}", self.text_pointer()),
            })?;

        extract_score(text)
    }
}
