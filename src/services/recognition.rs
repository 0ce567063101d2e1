use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::core::config::Settings;
use crate::services::errors::PipelineError;

/// One detected line: corner points, text and confidence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawLine")]
pub struct RecognizedLine {
    pub geometry: Vec<[f32; 2]>,
    pub text: String,
    pub confidence: f32,
}

type RawLine = (Vec<[f32; 2]>, (String, f32));

impl From<RawLine> for RecognizedLine {
    fn from((geometry, (text, confidence)): RawLine) -> Self {
        Self { geometry, text, confidence }
    }
}

/// Process-wide OCR capability, built once at startup and shared read-only.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Returns detected lines grouped the way the engine groups them, in the
    /// engine's own top-to-bottom order.
    async fn recognize(&self, image_png: Vec<u8>) -> Result<Vec<Vec<RecognizedLine>>, PipelineError>;
}

/// Keeps only the text, preserving group and line order.
pub fn flatten_text(groups: Vec<Vec<RecognizedLine>>) -> Vec<String> {
    groups.into_iter().flatten().map(|line| line.text).collect()
}

#[derive(Debug, Deserialize)]
struct OcrServiceResponse {
    result: Vec<Option<Vec<RecognizedLine>>>,
}

/// Client for an OCR server that answers with PaddleOCR-shaped JSON.
#[derive(Debug, Clone)]
pub(crate) struct HttpRecognizer {
    client: Client,
    endpoint: String,
}

impl HttpRecognizer {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.ocr().request_timeout))
            .build()
            .context("Failed to build OCR HTTP client")?;

        Ok(Self { client, endpoint: settings.ocr().service_url.clone() })
    }
}

#[async_trait]
impl TextRecognizer for HttpRecognizer {
    async fn recognize(&self, image_png: Vec<u8>) -> Result<Vec<Vec<RecognizedLine>>, PipelineError> {
        let part = Part::bytes(image_png)
            .file_name("page.png")
            .mime_str("image/png")
            .map_err(|err| PipelineError::Recognition(err.to_string()))?;
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| PipelineError::Recognition(format!("OCR service unreachable: {err}")))?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|err| {
            PipelineError::Recognition(format!("failed to read OCR response: {err}"))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&raw_body)
                .map(|payload| extract_error_message(&payload))
                .unwrap_or(raw_body);
            return Err(PipelineError::Recognition(format!(
                "OCR service returned status {status}: {detail}"
            )));
        }

        parse_response(&raw_body)
    }
}

fn parse_response(raw_body: &str) -> Result<Vec<Vec<RecognizedLine>>, PipelineError> {
    let parsed: OcrServiceResponse = serde_json::from_str(raw_body).map_err(|err| {
        PipelineError::Recognition(format!("OCR service returned malformed JSON: {err}"))
    })?;

    Ok(parsed.result.into_iter().map(Option::unwrap_or_default).collect())
}

fn extract_error_message(payload: &Value) -> String {
    payload
        .get("detail")
        .and_then(Value::as_str)
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}
