pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::llm::OpenAiChatModel;
use crate::services::recognition::HttpRecognizer;
use crate::services::storage::S3ObjectStore;

pub use crate::services::analysis::CodeAnalyzer;
pub use crate::services::batch::{BatchOrchestrator, BatchOutcome, ImageAsset, Submission};
pub use crate::services::correction::{correction_payload, TextCorrector, CODE_SENTINEL};
pub use crate::services::errors::{BatchError, BatchStep, PipelineError};
pub use crate::services::llm::{ChatMessage, ChatModel, ChatRole};
pub use crate::services::markers::extract;
pub use crate::services::paths::{
    object_key, sample_file_name, PathError, PathResolver, PathSchema, SubmissionDimensions,
    UrlGenerator, DEFAULT_PATH_SCHEMA,
};
pub use crate::services::preprocess::preprocess;
pub use crate::services::recognition::{flatten_text, RecognizedLine, TextRecognizer};
pub use crate::services::storage::{ObjectStore, StoredObject};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    crate::core::metrics::init(&settings)?;

    let storage = S3ObjectStore::from_settings(&settings)
        .await?
        .map(|store| Arc::new(store) as Arc<dyn ObjectStore>);
    if storage.is_none() {
        tracing::warn!("S3 credentials are not configured; recognition requests will be refused");
    }
    let recognizer: Arc<dyn TextRecognizer> = Arc::new(HttpRecognizer::from_settings(&settings)?);
    let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::from_settings(&settings)?);

    let state = AppState::new(settings, storage, recognizer, chat)?;
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        ocr_service = %state.settings().ocr().service_url,
        path_schema = %state.settings().paths().schema,
        "Handwriting OCR API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::core::shutdown::shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
