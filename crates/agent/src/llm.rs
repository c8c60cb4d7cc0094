use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use cloudplan_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const TEMPERATURE: f32 = 0.2;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Single-turn completion client for the supported hosted and local providers.
#[derive(Clone, Debug)]
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_tokens: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        config.require_credentials().map_err(|error| anyhow!(error))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build LLM HTTP client")?;

        let base_url = config
            .base_url
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("{} provider requires an API key", self.provider.as_str()))
    }

    async fn post(&self, request: reqwest::RequestBuilder, body: Value) -> Result<Value> {
        let response = request
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.provider.as_str()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} returned HTTP {}: {}", self.provider.as_str(), status.as_u16(), text.trim());
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("{} response was not JSON", self.provider.as_str()))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": TEMPERATURE,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let reply: AnthropicReply = serde_json::from_value(self.post(request, body).await?)
            .context("unexpected anthropic response shape")?;
        let text: String = reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        Ok(text)
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key()?);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": TEMPERATURE,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let reply: OpenAiReply = serde_json::from_value(self.post(request, body).await?)
            .context("unexpected openai response shape")?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("openai response contained no choices"))
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let request = self.client.post(format!("{}/api/generate", self.base_url));
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": TEMPERATURE, "num_predict": self.max_tokens },
        });

        let reply: OllamaReply = serde_json::from_value(self.post(request, body).await?)
            .context("unexpected ollama response shape")?;
        Ok(reply.response)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            event_name = "agent.llm.request",
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending completion request"
        );

        let reply = match self.provider {
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await?,
            LlmProvider::OpenAi => self.complete_openai(prompt).await?,
            LlmProvider::Ollama => self.complete_ollama(prompt).await?,
        };

        if reply.trim().is_empty() {
            bail!("{} returned an empty completion", self.provider.as_str());
        }
        Ok(reply)
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

#[derive(Deserialize)]
struct AnthropicReply {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiReply {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaReply {
    response: String,
}
