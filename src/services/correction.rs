use std::sync::Arc;

use crate::services::errors::PipelineError;
use crate::services::llm::{ChatMessage, ChatModel};
use crate::services::markers;

pub const CODE_SENTINEL: &str = "<<<OCR CODE FIELD>>>";

/// Every line of every image, images in submission order.
pub fn correction_payload(results: &[Vec<String>]) -> String {
    results.iter().flatten().map(String::as_str).collect::<Vec<_>>().join("\n")
}

#[derive(Clone)]
pub struct TextCorrector {
    model: Arc<dyn ChatModel>,
    language: String,
}

impl TextCorrector {
    pub fn new(model: Arc<dyn ChatModel>, language: impl Into<String>) -> Self {
        Self { model, language: language.into() }
    }

    pub fn build_prompt(&self, recognized: &str) -> String {
        let language = &self.language;
        format!(
            "There is handwritten {language} code that was put into an OCR system. \
             Postprocess it without adding any new lines or words, \
             correct OCR errors to make the names logical and the code real, \
             correct the code formatting according to {language}, including braces, \
             do not miss any lines given, include everything, but do NOT add \
             anything extra that is not written in the code given, \
             do not explain anything:\n\
             {recognized}\n\
             In the answer put the exact marker {CODE_SENTINEL} once immediately before \
             and once immediately after the code, and use it nowhere else."
        )
    }

    /// Sends the joined recognition output to the model and returns the span
    /// between the two sentinels, untrimmed.
    pub async fn correct(&self, results: &[Vec<String>]) -> Result<String, PipelineError> {
        let prompt = self.build_prompt(&correction_payload(results));
        let reply = self.model.complete(&[ChatMessage::user(prompt)], 0.0).await;

        let outcome = reply.and_then(|text| markers::extract(&text, CODE_SENTINEL));
        let status = match &outcome {
            Ok(_) => "ok",
            Err(err) => {
                tracing::warn!(error = %err, "Text correction failed");
                err.kind()
            }
        };
        metrics::counter!("llm_requests_total", "kind" => "correction", "status" => status)
            .increment(1);

        outcome
    }
}
