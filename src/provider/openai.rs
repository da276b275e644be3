//! OpenAI-compatible chat completions client (DeepSeek, OpenAI, vLLM, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatMessage, ProviderError, ReplyProvider};
use crate::config::ProviderConfig;

/// Request body for `chat/completions`
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Longest slice of an error body kept in a `ProviderError`
const MAX_ERROR_BODY: usize = 512;

pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    preamble: ChatMessage,
}

impl OpenAiProvider {
    /// `preamble` is sent as the leading system message of every call
    pub fn new(config: &ProviderConfig, preamble: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            preamble: ChatMessage::system(preamble),
        })
    }

    fn build_request<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(&self.preamble);
        all.extend(messages.iter());
        CompletionRequest {
            model: &self.model,
            messages: all,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[async_trait]
impl ReplyProvider for OpenAiProvider {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::NotConfigured("missing API key".to_string()));
        };

        let request = self.build_request(messages);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Malformed(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::Empty)?;

        if content.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(api_key: Option<&str>) -> OpenAiProvider {
        let config = ProviderConfig {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        };
        OpenAiProvider::new(&config, "You are a guide.").unwrap()
    }

    #[test]
    fn test_request_prepends_preamble_once() {
        let p = provider(Some("k"));
        let messages = vec![ChatMessage::user("hi")];
        let json = serde_json::to_value(p.build_request(&messages)).unwrap();

        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["max_tokens"], 1500);
        let sent = json["messages"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["role"], "system");
        assert_eq!(sent[0]["content"], "You are a guide.");
        assert_eq!(sent[1]["content"], "hi");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Be still."}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Be still."));
    }

    #[test]
    fn test_truncate_error_body() {
        let long = "é".repeat(MAX_ERROR_BODY + 10);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY + 3);
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let err = provider(None)
            .generate(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
