use std::sync::Arc;

use crate::services::errors::PipelineError;
use crate::services::llm::{ChatMessage, ChatModel};

/// Reviews a submitted program against its task statement.
#[derive(Clone)]
pub struct CodeAnalyzer {
    model: Arc<dyn ChatModel>,
    answer_language: String,
}

impl CodeAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>, answer_language: impl Into<String>) -> Self {
        Self { model, answer_language: answer_language.into() }
    }

    pub fn build_prompt(&self, task: &str, code: &str) -> String {
        format!(
            "You are an expert code reviewer and software engineer. \
             Below is a programming task description, followed by a code implementation. \
             Analyze the code and determine whether it correctly and completely fulfills \
             the task requirements. Be thorough and precise without suggesting any code. \
             Check for correctness: does the logic meet the exact requirements of the task? \
             Check for completeness: does it handle all specified cases, inputs and edge \
             conditions? Check for efficiency and readability. \
             Highlight any bugs, flaws or missing parts. \
             Do NOT just summarize the code, analyze it against the task. \
             The answer must be in {} language.\n\
             TASK DESCRIPTION:\n{task}\n\
             CODE:\n{code}",
            self.answer_language
        )
    }

    pub async fn analyze(&self, task: &str, code: &str) -> Result<String, PipelineError> {
        let prompt = self.build_prompt(task, code);
        let outcome = self.model.complete(&[ChatMessage::user(prompt)], 0.0).await;

        let status = outcome.as_ref().map_or_else(|err| err.kind(), |_| "ok");
        metrics::counter!("llm_requests_total", "kind" => "analysis", "status" => status)
            .increment(1);

        outcome
    }
}
