//! Drives one submission through upload, binarization and recognition.
//!
//! Each image is one future (upload raw bytes, then decode, preprocess and
//! recognize). Futures run through `buffer_unordered` with the configured
//! bound; results are reassembled by image index. The first failure stops
//! new images from being started, images already in flight are drained and
//! the lowest failing index is reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{future, stream, StreamExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::services::errors::{BatchError, BatchStep, PipelineError};
use crate::services::paths::{object_key, PathResolver, SubmissionDimensions};
use crate::services::preprocess::preprocess;
use crate::services::recognition::{flatten_text, TextRecognizer};
use crate::services::storage::ObjectStore;

#[derive(Debug, Clone)]
pub struct ImageAsset {
    index: usize,
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    /// 1-based position inside its submission.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub dimensions: SubmissionDimensions,
    images: Vec<ImageAsset>,
}

impl Submission {
    pub fn new(dimensions: SubmissionDimensions) -> Self {
        Self { dimensions, images: Vec::new() }
    }

    /// Appends an image; its index is its arrival position.
    pub fn push_image(
        &mut self,
        file_name: Option<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> usize {
        let index = self.images.len() + 1;
        self.images.push(ImageAsset {
            index,
            file_name,
            content_type: content_type.into(),
            bytes,
        });
        index
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// One entry per image, in image-index order.
    pub results: Vec<Vec<String>>,
    pub folder_path: String,
}

struct ImageFailure {
    index: usize,
    step: BatchStep,
    source: PipelineError,
}

impl From<ImageFailure> for BatchError {
    fn from(failure: ImageFailure) -> Self {
        BatchError::Image { index: failure.index, step: failure.step, source: failure.source }
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    storage: Arc<dyn ObjectStore>,
    recognizer: Arc<dyn TextRecognizer>,
    paths: PathResolver,
    concurrency: usize,
    image_timeout: Option<Duration>,
}

impl BatchOrchestrator {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn TextRecognizer>,
        paths: PathResolver,
    ) -> Self {
        Self { storage, recognizer, paths, concurrency: 1, image_timeout: None }
    }

    /// Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_image_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.image_timeout = timeout.filter(|value| !value.is_zero());
        self
    }

    pub async fn process_batch(&self, submission: Submission) -> Result<BatchOutcome, BatchError> {
        if submission.is_empty() {
            return Err(BatchError::Empty);
        }

        let folder_path = self.paths.folder(&submission.dimensions)?;
        let image_count = submission.len();
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "ocr_batch",
            %batch_id,
            folder = %folder_path,
            images = image_count,
            concurrency = self.concurrency
        );

        async move {
            let started = Instant::now();
            let aborted = AtomicBool::new(false);
            let folder = folder_path.as_str();

            let outcomes: Vec<Result<(usize, Vec<String>), ImageFailure>> =
                stream::iter(submission.images)
                    .take_while(|_| future::ready(!aborted.load(Ordering::Acquire)))
                    .map(|asset| self.run_image(folder, asset))
                    .buffer_unordered(self.concurrency)
                    .inspect(|outcome| {
                        if outcome.is_err() {
                            aborted.store(true, Ordering::Release);
                        }
                    })
                    .collect()
                    .await;

            metrics::histogram!("ocr_batch_duration_seconds")
                .record(started.elapsed().as_secs_f64());

            let mut pages = Vec::with_capacity(image_count);
            let mut failure: Option<ImageFailure> = None;
            for outcome in outcomes {
                match outcome {
                    Ok(page) => pages.push(page),
                    Err(err) if failure.as_ref().map_or(true, |seen| err.index < seen.index) => {
                        failure = Some(err);
                    }
                    Err(_) => {}
                }
            }

            if let Some(failure) = failure {
                tracing::warn!(
                    index = failure.index,
                    step = %failure.step,
                    error = %failure.source,
                    "Batch aborted"
                );
                return Err(failure.into());
            }

            pages.sort_by_key(|(index, _)| *index);
            let results = pages.into_iter().map(|(_, lines)| lines).collect();

            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch recognized"
            );
            Ok(BatchOutcome { results, folder_path: folder.to_string() })
        }
        .instrument(span)
        .await
    }

    async fn run_image(
        &self,
        folder: &str,
        asset: ImageAsset,
    ) -> Result<(usize, Vec<String>), ImageFailure> {
        let index = asset.index;
        let mut step = BatchStep::Upload;
        let outcome = match self.image_timeout {
            Some(limit) => {
                let finished =
                    tokio::time::timeout(limit, self.process_image(folder, asset, &mut step)).await;
                finished.unwrap_or_else(|_| {
                    Err(ImageFailure { index, step, source: step.timed_out(limit) })
                })
            }
            None => self.process_image(folder, asset, &mut step).await,
        };

        let status = if outcome.is_ok() { "ok" } else { "failed" };
        metrics::counter!("ocr_images_total", "status" => status).increment(1);
        outcome
    }

    async fn process_image(
        &self,
        folder: &str,
        asset: ImageAsset,
        step: &mut BatchStep,
    ) -> Result<(usize, Vec<String>), ImageFailure> {
        let ImageAsset { index, file_name, content_type, bytes } = asset;
        let fail = |step: BatchStep| move |source: PipelineError| ImageFailure { index, step, source };

        let key = object_key(folder, index);
        *step = BatchStep::Upload;
        self.storage
            .put(&key, &content_type, bytes.clone())
            .await
            .map_err(fail(BatchStep::Upload))?;

        *step = BatchStep::Decode;
        let binarized = preprocess(&bytes).map_err(fail(BatchStep::Decode))?;
        drop(bytes);

        *step = BatchStep::Recognition;
        let groups = self
            .recognizer
            .recognize(binarized)
            .await
            .map_err(fail(BatchStep::Recognition))?;
        let lines = flatten_text(groups);

        tracing::debug!(
            index,
            key = %key,
            file_name = file_name.as_deref().unwrap_or("-"),
            lines = lines.len(),
            "Image recognized"
        );
        Ok((index, lines))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::services::paths::{PathSchema, DEFAULT_PATH_SCHEMA};
    use crate::test_support::{png_of_width, FakeRecognizer, InMemoryStore};

    fn dimensions() -> SubmissionDimensions {
        SubmissionDimensions::new()
            .with("year", 2025)
            .with("module", 1)
            .with("student", 42)
            .with("assignment", 7)
    }

    fn orchestrator(store: Arc<InMemoryStore>, recognizer: Arc<FakeRecognizer>) -> BatchOrchestrator {
        let schema = PathSchema::parse(DEFAULT_PATH_SCHEMA).expect("schema");
        BatchOrchestrator::new(store, recognizer, PathResolver::new(schema))
    }

    fn submission(widths: &[u32]) -> Submission {
        let mut submission = Submission::new(dimensions());
        for width in widths {
            submission.push_image(None, "image/png", png_of_width(*width));
        }
        submission
    }

    #[tokio::test]
    async fn two_images_land_under_the_shared_folder() {
        let store = Arc::new(InMemoryStore::default());
        let recognizer = Arc::new(FakeRecognizer::default());
        let batch = orchestrator(store.clone(), recognizer);

        let input = submission(&[3, 4]);
        let raw_first = input.images()[0].bytes.clone();
        let outcome = batch.process_batch(input).await.expect("batch");

        assert_eq!(outcome.folder_path, "2025/module_1/student_42/assignment_7");
        assert_eq!(
            store.keys(),
            vec![
                "2025/module_1/student_42/assignment_7/sample1.png",
                "2025/module_1/student_42/assignment_7/sample2.png",
            ]
        );
        assert_eq!(
            store.object("2025/module_1/student_42/assignment_7/sample1.png"),
            Some(raw_first)
        );
        assert_eq!(outcome.results, vec![vec!["width 3"], vec!["width 4"]]);
    }

    #[tokio::test]
    async fn results_follow_index_not_completion_order() {
        let store = Arc::new(InMemoryStore::default());
        let recognizer = Arc::new(
            FakeRecognizer::default()
                .delay_for(1, Duration::from_millis(60))
                .delay_for(2, Duration::from_millis(30)),
        );
        let batch = orchestrator(store, recognizer).with_concurrency(3);

        let outcome = batch.process_batch(submission(&[1, 2, 3])).await.expect("batch");
        assert_eq!(outcome.results, vec![vec!["width 1"], vec!["width 2"], vec!["width 3"]]);
    }

    #[tokio::test]
    async fn recognition_failure_on_second_image_aborts_the_batch() {
        let store = Arc::new(InMemoryStore::default());
        let recognizer = Arc::new(FakeRecognizer::default().failing_for(2));
        let batch = orchestrator(store.clone(), recognizer);

        let err = batch.process_batch(submission(&[1, 2, 3])).await.unwrap_err();
        match err {
            BatchError::Image { index, step, source } => {
                assert_eq!(index, 2);
                assert_eq!(step, BatchStep::Recognition);
                assert!(matches!(source, PipelineError::Recognition(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Sequential mode never starts the third image.
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn lowest_failing_index_wins_under_concurrency() {
        let store = Arc::new(InMemoryStore::default());
        let recognizer = Arc::new(
            FakeRecognizer::default()
                .failing_for(2)
                .failing_for(3)
                .delay_for(2, Duration::from_millis(40)),
        );
        let batch = orchestrator(store, recognizer).with_concurrency(3);

        let err = batch.process_batch(submission(&[1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, BatchError::Image { index: 2, .. }), "got: {err}");
    }

    #[tokio::test]
    async fn undecodable_image_fails_in_decode_step_after_upload() {
        let store = Arc::new(InMemoryStore::default());
        let batch = orchestrator(store.clone(), Arc::new(FakeRecognizer::default()));

        let mut input = submission(&[2]);
        input.push_image(Some("scan.png".to_string()), "image/png", b"not a png".to_vec());

        let err = batch.process_batch(input).await.unwrap_err();
        assert!(
            matches!(
                err,
                BatchError::Image { index: 2, step: BatchStep::Decode, source: PipelineError::Decode(_) }
            ),
            "got: {err}"
        );
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn upload_failure_is_reported_with_its_index() {
        let store = Arc::new(InMemoryStore::failing_on("sample1.png"));
        let recognizer = Arc::new(FakeRecognizer::default());
        let batch = orchestrator(store, recognizer.clone());

        let err = batch.process_batch(submission(&[5, 6])).await.unwrap_err();
        assert!(
            matches!(err, BatchError::Image { index: 1, step: BatchStep::Upload, .. }),
            "got: {err}"
        );
        assert_eq!(recognizer.calls(), 0);
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_before_upload() {
        let store = Arc::new(InMemoryStore::default());
        let batch = orchestrator(store.clone(), Arc::new(FakeRecognizer::default()));

        let err = batch.process_batch(Submission::new(dimensions())).await.unwrap_err();
        assert!(matches!(err, BatchError::Empty));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn missing_dimension_fails_before_any_work() {
        let store = Arc::new(InMemoryStore::default());
        let batch = orchestrator(store.clone(), Arc::new(FakeRecognizer::default()));

        let mut input = Submission::new(SubmissionDimensions::new().with("year", 2025));
        input.push_image(None, "image/png", png_of_width(2));

        let err = batch.process_batch(input).await.unwrap_err();
        assert!(matches!(err, BatchError::Path(_)), "got: {err}");
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn slow_image_times_out_as_recognition_error() {
        let store = Arc::new(InMemoryStore::default());
        let recognizer =
            Arc::new(FakeRecognizer::default().delay_for(1, Duration::from_millis(500)));
        let batch = orchestrator(store, recognizer)
            .with_image_timeout(Some(Duration::from_millis(20)));

        let err = batch.process_batch(submission(&[1])).await.unwrap_err();
        assert!(
            matches!(
                err,
                BatchError::Image { index: 1, step: BatchStep::Recognition, source: PipelineError::Recognition(_) }
            ),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn slow_upload_times_out_as_upload_error() {
        let store = Arc::new(InMemoryStore::delaying(Duration::from_millis(500)));
        let recognizer = Arc::new(FakeRecognizer::default());
        let batch = orchestrator(store.clone(), recognizer.clone())
            .with_image_timeout(Some(Duration::from_millis(20)));

        let err = batch.process_batch(submission(&[1])).await.unwrap_err();
        assert!(
            matches!(
                err,
                BatchError::Image { index: 1, step: BatchStep::Upload, source: PipelineError::Upload(_) }
            ),
            "got: {err}"
        );
        assert!(store.keys().is_empty());
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn indexes_follow_arrival_order() {
        let mut input = Submission::new(dimensions());
        assert_eq!(input.push_image(None, "image/png", Vec::new()), 1);
        assert_eq!(input.push_image(None, "image/jpeg", Vec::new()), 2);
        assert_eq!(input.images()[1].index(), 2);
    }
}
