use std::collections::BTreeMap;

use serde::Serialize;

pub(crate) mod ocr;

pub(crate) use ocr::{
    AnalyzeRequest, AnalyzeResponse, FileUrlRequest, FileUrlResponse, PostprocessRequest,
    PostprocessResponse, RecognizeResponse,
};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) api_prefix: String,
}
