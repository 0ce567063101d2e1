use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub(crate) struct RecognizeResponse {
    /// Lines per image, in upload order.
    pub(crate) results: Vec<Vec<String>>,
    /// Storage folder shared by every uploaded image.
    pub(crate) work_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostprocessRequest {
    #[serde(default)]
    pub(crate) results: Vec<Vec<String>>,
    #[serde(default)]
    pub(crate) work_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostprocessResponse {
    pub(crate) response: String,
    pub(crate) work_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct FileUrlRequest {
    #[validate(range(max = 1000, message = "file_num must be in range 0..1000"))]
    pub(crate) file_num: usize,
    #[validate(length(min = 1, message = "object_key must not be empty"))]
    pub(crate) object_key: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FileUrlResponse {
    pub(crate) urls: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnalyzeRequest {
    #[validate(length(min = 1, message = "task must not be empty"))]
    pub(crate) task: String,
    #[validate(length(min = 1, message = "code must not be empty"))]
    pub(crate) code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeResponse {
    pub(crate) response: String,
}
