//! OpenRouter chat-completions generator.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use eascope_shared::{EascopeError, OpenRouterConfig, Parameters, Result};

use super::{TextGenerator, UpstreamArtifact};
use crate::prompt::PromptCatalog;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Generator that calls `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    prompts: PromptCatalog,
}

impl OpenRouterGenerator {
    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &OpenRouterConfig, prompts: PromptCatalog) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                EascopeError::config(format!(
                    "OpenRouter API key not found. Set the {} environment variable.",
                    config.api_key_env
                ))
            })?;

        Self::new(config, api_key, prompts)
    }

    pub fn new(
        config: &OpenRouterConfig,
        api_key: impl Into<String>,
        prompts: PromptCatalog,
    ) -> Result<Self> {
        let endpoint = chat_endpoint(&config.base_url)?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("EAScope/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| EascopeError::Network(format!("client build: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: config.default_model.clone(),
            temperature: config.temperature,
            prompts,
        })
    }
}

/// `{base_url}/chat/completions`, tolerating a trailing slash on the base.
fn chat_endpoint(base_url: &str) -> Result<Url> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|u| u.join("chat/completions"))
        .map_err(|e| EascopeError::config(format!("invalid OpenRouter base_url '{base_url}': {e}")))
}

#[async_trait]
impl TextGenerator for OpenRouterGenerator {
    #[instrument(skip_all, fields(stage = stage_id, model = %self.model))]
    async fn generate(
        &self,
        stage_id: &str,
        parameters: &Parameters,
        upstream: &[UpstreamArtifact],
    ) -> Result<String> {
        let prompt = self.prompts.render(stage_id, parameters, upstream)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EascopeError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let shown: String = body.chars().take(300).collect();
            return Err(EascopeError::Network(format!(
                "{}: HTTP {status}: {shown}",
                self.endpoint
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| EascopeError::Generation(format!("invalid completion response: {e}")))?;

        if let Some(usage) = &body.usage {
            debug!(
                tokens_in = usage.prompt_tokens,
                tokens_out = usage.completion_tokens,
                "completion received"
            );
        }

        extract_text(body)
    }
}

fn extract_text(body: ChatResponse) -> Result<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| EascopeError::Generation("completion contained no text".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_or_without_slash() {
        for base in ["https://openrouter.ai/api/v1", "https://openrouter.ai/api/v1/"] {
            assert_eq!(
                chat_endpoint(base).unwrap().as_str(),
                "https://openrouter.ai/api/v1/chat/completions"
            );
        }
    }

    #[test]
    fn bad_base_url_is_config_error() {
        let err = chat_endpoint("not a url").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn request_serializes_in_chat_shape() {
        let request = ChatRequest {
            model: "openai/gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn first_choice_text_is_returned() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"1. Engage"}}],"usage":{"prompt_tokens":10,"completion_tokens":3}}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "1. Engage");
    }

    #[test]
    fn empty_completion_is_an_error() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(matches!(extract_text(body), Err(EascopeError::Generation(_))));

        let body: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_text(body).is_err());
    }

    #[test]
    fn missing_key_env_is_config_error() {
        let config = OpenRouterConfig {
            api_key_env: "EASCOPE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..OpenRouterConfig::default()
        };
        let err = OpenRouterGenerator::from_config(&config, PromptCatalog::default()).unwrap_err();
        assert!(err.is_configuration());
    }
}
