use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let api = state.settings().api();
    Json(RootResponse {
        message: api.project_name.clone(),
        version: api.version.clone(),
        api_prefix: api.api_v1_str.clone(),
    })
}

/// Reports configuration-level readiness only; collaborators are not contacted.
pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy";
    let mut components = BTreeMap::new();

    if state.storage_configured() {
        components.insert("storage".to_string(), "configured".to_string());
    } else {
        components.insert("storage".to_string(), "not configured".to_string());
        status = "degraded";
    }

    if state.settings().llm().api_key.is_empty() {
        components.insert("llm".to_string(), "missing api key".to_string());
        status = "degraded";
    } else {
        components.insert("llm".to_string(), state.settings().llm().model.clone());
    }

    components.insert("ocr".to_string(), state.settings().ocr().service_url.clone());

    Json(HealthResponse {
        service: "handwriting-ocr".to_string(),
        status: status.to_string(),
        components,
    })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
