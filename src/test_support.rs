use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::services::errors::PipelineError;
use crate::services::llm::{ChatMessage, ChatModel};
use crate::services::recognition::{RecognizedLine, TextRecognizer};
use crate::services::storage::{ObjectStore, StoredObject};

const MULTIPART_BOUNDARY: &str = "handwriting-ocr-test-boundary";

pub(crate) struct TestContext {
    pub(crate) app: Router,
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) recognizer: Arc<FakeRecognizer>,
    pub(crate) chat: Arc<ScriptedChatModel>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("OCR_ENV", "test");
    std::env::set_var("OCR_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    for name in [
        "ENVIRONMENT",
        "API_V1_STR",
        "BACKEND_CORS_ORIGINS",
        "LLM_API_KEY",
        "OCR_BATCH_CONCURRENCY",
        "OCR_IMAGE_TIMEOUT_SECONDS",
        "MAX_UPLOAD_SIZE_MB",
        "MAX_IMAGES_PER_SUBMISSION",
        "PATH_SCHEMA",
        "S3_ENDPOINT",
        "S3_ACCESS_KEY",
        "S3_SECRET_KEY",
        "S3_BUCKET",
        "S3_REGION",
        "S3_PUBLIC_BASE_URL",
    ] {
        std::env::remove_var(name);
    }
}

pub(crate) fn set_test_storage_env() {
    std::env::set_var("S3_ENDPOINT", "http://localhost:9000");
    std::env::set_var("S3_ACCESS_KEY", "test-access-key");
    std::env::set_var("S3_SECRET_KEY", "test-secret-key");
    std::env::set_var("S3_BUCKET", "handwriting-test-bucket");
    std::env::set_var("S3_REGION", "ru-1");
}

/// Router backed by in-memory collaborators. `env` is applied on top of the
/// test environment before settings are loaded.
pub(crate) async fn setup_test_context(
    env: &[(&str, &str)],
    recognizer: FakeRecognizer,
    chat: ScriptedChatModel,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    for (name, value) in env {
        std::env::set_var(name, value);
    }

    let settings = Settings::load().expect("settings");
    let store = Arc::new(InMemoryStore::default());
    let recognizer = Arc::new(recognizer);
    let chat = Arc::new(chat);

    let state = AppState::new(
        settings,
        Some(store.clone() as Arc<dyn ObjectStore>),
        recognizer.clone(),
        chat.clone(),
    )
    .expect("state");

    TestContext { app: api::router::router(state), store, recognizer, chat, _guard: guard }
}

pub(crate) fn build_state_without_storage(settings: Settings) -> AppState {
    AppState::new(
        settings,
        None,
        Arc::new(FakeRecognizer::default()),
        Arc::new(ScriptedChatModel::replying("")),
    )
    .expect("state")
}

/// Records every put; optionally rejects keys ending with a given suffix or
/// stalls before each write.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    objects: StdMutex<Vec<(String, Vec<u8>)>>,
    fail_suffix: Option<String>,
    delay: Option<Duration>,
}

impl InMemoryStore {
    pub(crate) fn failing_on(suffix: &str) -> Self {
        Self { fail_suffix: Some(suffix.to_string()), ..Self::default() }
    }

    pub(crate) fn delaying(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().iter().map(|(key, _)| key.clone()).collect()
    }

    pub(crate) fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(stored, _)| stored == key)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, PipelineError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_suffix.as_deref().is_some_and(|suffix| key.ends_with(suffix)) {
            return Err(PipelineError::Upload(format!("bucket rejected '{key}'")));
        }
        let stored = StoredObject::describe(key, &bytes);
        self.objects.lock().unwrap().push((key.to_string(), bytes));
        Ok(stored)
    }
}

/// Answers `width {w}` for a page `w` pixels wide. Behaviour per width can be
/// scripted with delays and failures.
#[derive(Default)]
pub(crate) struct FakeRecognizer {
    delays: HashMap<u32, Duration>,
    failures: HashSet<u32>,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    pub(crate) fn delay_for(mut self, width: u32, delay: Duration) -> Self {
        self.delays.insert(width, delay);
        self
    }

    pub(crate) fn failing_for(mut self, width: u32) -> Self {
        self.failures.insert(width);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(
        &self,
        image_png: Vec<u8>,
    ) -> Result<Vec<Vec<RecognizedLine>>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let width = image::load_from_memory(&image_png).expect("binarized png").width();

        if let Some(delay) = self.delays.get(&width) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(&width) {
            return Err(PipelineError::Recognition(format!("engine crashed on width {width}")));
        }

        Ok(vec![vec![RecognizedLine {
            geometry: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            text: format!("width {width}"),
            confidence: 0.9,
        }]])
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) temperature: f32,
}

/// Returns one fixed reply (or error) and records what it was asked.
pub(crate) struct ScriptedChatModel {
    reply: Result<String, String>,
    calls: StdMutex<Vec<RecordedCall>>,
}

impl ScriptedChatModel {
    pub(crate) fn replying(reply: &str) -> Self {
        Self { reply: Ok(reply.to_string()), calls: StdMutex::new(Vec::new()) }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self { reply: Err(message.to_string()), calls: StdMutex::new(Vec::new()) }
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, PipelineError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { messages: messages.to_vec(), temperature });
        self.reply.clone().map_err(PipelineError::ModelService)
    }
}

/// White page `width`x4 with one dark pixel, encoded as PNG.
pub(crate) fn png_of_width(width: u32) -> Vec<u8> {
    let mut page = RgbImage::from_pixel(width, 4, Rgb([255, 255, 255]));
    page.put_pixel(0, 1, Rgb([10, 10, 10]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(page)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode fixture");
    buf
}

pub(crate) enum FormPart<'a> {
    Text { name: &'a str, value: &'a str },
    File { name: &'a str, file_name: &'a str, content_type: &'a str, bytes: Vec<u8> },
}

pub(crate) fn multipart_request(uri: &str, parts: Vec<FormPart<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
            FormPart::File { name, file_name, content_type, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                    )
                    .as_bytes(),
                );
                // An empty content type leaves the header out.
                if !content_type.is_empty() {
                    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) fn json_request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
