//! Chat-completions client used for answer synthesis and feedback scoring.
//!
//! Works against any endpoint following the OpenAI chat completions format.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use ragkit_core::config::LlmSettings;
use ragkit_core::credentials::{require_api_key, OPENAI_API_KEY};
use ragkit_core::traits::LanguageModel;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected response: {0}")]
    ResponseParse(String),
}

pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    /// Client from settings, reading the key from `OPENAI_API_KEY`.
    pub fn from_settings(settings: &LlmSettings) -> anyhow::Result<Self> {
        let api_key = require_api_key(OPENAI_API_KEY)?;
        Ok(Self::new_with_key(settings, api_key))
    }

    pub fn new_with_key(settings: &LlmSettings, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }

    /// Same endpoint and key with a different model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": false,
        })
    }

    fn parse_response(body: &Value) -> Result<String, LlmError> {
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::ResponseParse("no message content in first choice".to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "sending completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(LlmError::from)?;
        let status = response.status();
        let text = response.text().await.map_err(LlmError::from)?;
        if !status.is_success() {
            return Err(LlmError::Http { status: status.as_u16(), body: text }.into());
        }
        let json: Value = serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        Ok(Self::parse_response(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings { base_url: "http://localhost:1/v1/".to_string(), ..Default::default() }
    }

    #[test]
    fn request_body_carries_model_and_temperature() {
        let llm = OpenAiChat::new_with_key(&settings(), "k".into());
        let body = llm.request_body("hi");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(llm.base_url, "http://localhost:1/v1");
    }

    #[test]
    fn parses_first_choice() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": " Paris. "}}]});
        assert_eq!(OpenAiChat::parse_response(&body).unwrap(), "Paris.");
        assert!(OpenAiChat::parse_response(&json!({"choices": []})).is_err());
    }

    #[test]
    fn with_model_overrides_name() {
        let llm = OpenAiChat::new_with_key(&settings(), "k".into()).with_model("gpt-4o-mini");
        assert_eq!(llm.model_name(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let llm = OpenAiChat::new_with_key(&settings(), "k".into());
        assert!(llm.complete("hello").await.is_err());
    }
}
