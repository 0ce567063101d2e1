use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::services::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Language-model capability. Only the first completion is ever used.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, PipelineError>;
}

/// OpenAI-compatible `/chat/completions` client (Groq, OpenAI, vLLM...).
/// A failed call is surfaced immediately; there is no retry.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiChatModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChatModel {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(settings.llm().request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.llm().api_key.clone(),
            base_url: settings.llm().base_url.trim_end_matches('/').to_string(),
            model: settings.llm().model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, PipelineError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| PipelineError::ModelService(format!("failed to call LLM API: {err}")))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(PipelineError::ModelService(format!(
                "LLM API error (status {status}): {}",
                upstream_message(&body)
            )));
        }

        first_completion(&body)
    }
}

fn first_completion(body: &Value) -> Result<String, PipelineError> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            PipelineError::ModelService("LLM response contained no completion content".to_string())
        })
}

fn upstream_message(body: &Value) -> String {
    body.get("error")
        .and_then(|error| error.get("message").and_then(Value::as_str).or_else(|| error.as_str()))
        .map(ToString::to_string)
        .unwrap_or_else(|| body.to_string())
}
