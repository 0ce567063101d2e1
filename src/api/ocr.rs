use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use time::{macros::format_description, OffsetDateTime};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::validation::{validate_dimension_value, validate_image_content_type, UploadLimits};
use crate::core::state::AppState;
use crate::schemas::{
    AnalyzeRequest, AnalyzeResponse, FileUrlRequest, FileUrlResponse, PostprocessRequest,
    PostprocessResponse, RecognizeResponse,
};
use crate::services::batch::Submission;
use crate::services::paths::SubmissionDimensions;

const IMAGES_FIELD: &str = "images";
const CHECK_DATE_DIMENSION: &str = "check_date";

pub(crate) fn router(limits: UploadLimits) -> Router<AppState> {
    Router::new()
        .route(
            "/recognize",
            post(recognize).layer(DefaultBodyLimit::max(limits.max_body_bytes())),
        )
        .route("/postprocess-text", post(postprocess_text))
        .route("/get-file-url", post(get_file_url))
        .route("/analyze-code", post(analyze_code))
}

async fn recognize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let orchestrator = state.batch_orchestrator().ok_or_else(|| {
        ApiError::ServiceUnavailable("Object storage is not configured".to_string())
    })?;
    let limits = UploadLimits::from_settings(state.settings());
    let schema = &state.settings().paths().schema;

    let mut submission = Submission::new(SubmissionDimensions::new());

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Invalid multipart data: {err}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == IMAGES_FIELD {
            let file_name = field.file_name().map(ToString::to_string);
            let content_type =
                validate_image_content_type(file_name.as_deref(), field.content_type())?;

            if submission.len() >= limits.max_images {
                return Err(ApiError::BadRequest(format!(
                    "Maximum number of images per submission exceeded ({})",
                    limits.max_images
                )));
            }

            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() + chunk.len() > limits.max_bytes_per_image {
                    return Err(ApiError::BadRequest(format!(
                        "File size exceeds {}MB limit",
                        state.settings().storage().max_upload_size_mb
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }

            submission.push_image(file_name, content_type, bytes);
        } else if schema.references(&name) {
            let value = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest(format!("Invalid value for field '{name}'")))?;
            validate_dimension_value(&name, &value)?;
            submission.dimensions.insert(name, value);
        } else {
            tracing::debug!(field = %name, "Ignoring unknown multipart field");
        }
    }

    if submission.is_empty() {
        return Err(ApiError::BadRequest("At least one image is required".to_string()));
    }

    if schema.references(CHECK_DATE_DIMENSION) && !submission.dimensions.contains(CHECK_DATE_DIMENSION)
    {
        submission.dimensions.insert(CHECK_DATE_DIMENSION, today_utc()?);
    }

    if let Some(missing) = schema.dimension_names().find(|name| !submission.dimensions.contains(name))
    {
        return Err(ApiError::BadRequest(format!("Field '{missing}' is required")));
    }

    tracing::info!(images = submission.len(), "Recognition requested");
    let outcome = orchestrator.process_batch(submission).await?;

    Ok(Json(RecognizeResponse { results: outcome.results, work_url: outcome.folder_path }))
}

fn today_utc() -> Result<String, ApiError> {
    OffsetDateTime::now_utc()
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|err| ApiError::internal(err, "Failed to format current date"))
}

async fn postprocess_text(
    State(state): State<AppState>,
    Json(payload): Json<PostprocessRequest>,
) -> Result<Json<PostprocessResponse>, ApiError> {
    let response = state.corrector().correct(&payload.results).await?;

    Ok(Json(PostprocessResponse { response, work_url: payload.work_url }))
}

async fn get_file_url(
    State(state): State<AppState>,
    Json(payload): Json<FileUrlRequest>,
) -> Result<Json<FileUrlResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let urls = state.urls().generate_urls(payload.file_num, &payload.object_key)?;
    Ok(Json(FileUrlResponse { urls }))
}

async fn analyze_code(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let response = state.analyzer().analyze(&payload.task, &payload.code).await?;
    Ok(Json(AnalyzeResponse { response }))
}
