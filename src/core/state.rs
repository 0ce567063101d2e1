use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Settings;
use crate::services::analysis::CodeAnalyzer;
use crate::services::batch::BatchOrchestrator;
use crate::services::correction::TextCorrector;
use crate::services::llm::ChatModel;
use crate::services::paths::{PathError, PathResolver, UrlGenerator};
use crate::services::recognition::TextRecognizer;
use crate::services::storage::ObjectStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    storage: Option<Arc<dyn ObjectStore>>,
    recognizer: Arc<dyn TextRecognizer>,
    chat: Arc<dyn ChatModel>,
    urls: UrlGenerator,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        storage: Option<Arc<dyn ObjectStore>>,
        recognizer: Arc<dyn TextRecognizer>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self, PathError> {
        let urls = match settings.s3().public_base_url.as_deref() {
            Some(base) => UrlGenerator::new(base)?,
            None => UrlGenerator::for_bucket(&settings.s3().endpoint, &settings.s3().bucket)?,
        };

        Ok(Self { inner: Arc::new(InnerState { settings, storage, recognizer, chat, urls }) })
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn storage_configured(&self) -> bool {
        self.inner.storage.is_some()
    }

    pub(crate) fn urls(&self) -> &UrlGenerator {
        &self.inner.urls
    }

    /// `None` while object storage is not configured.
    pub(crate) fn batch_orchestrator(&self) -> Option<BatchOrchestrator> {
        let storage = self.inner.storage.clone()?;
        let ocr = self.settings().ocr();

        Some(
            BatchOrchestrator::new(
                storage,
                self.inner.recognizer.clone(),
                PathResolver::new(self.settings().paths().schema.clone()),
            )
            .with_concurrency(ocr.batch_concurrency)
            .with_image_timeout(Some(Duration::from_secs(ocr.image_timeout_seconds))),
        )
    }

    pub(crate) fn corrector(&self) -> TextCorrector {
        TextCorrector::new(self.inner.chat.clone(), self.settings().llm().correction_language.clone())
    }

    pub(crate) fn analyzer(&self) -> CodeAnalyzer {
        CodeAnalyzer::new(self.inner.chat.clone(), self.settings().llm().analysis_language.clone())
    }
}
