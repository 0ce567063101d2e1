use crate::api::errors::ApiError;
use crate::core::config::Settings;

/// Upload limits for one `/recognize` call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UploadLimits {
    pub(crate) max_images: usize,
    pub(crate) max_bytes_per_image: usize,
}

impl UploadLimits {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let storage = settings.storage();
        Self {
            max_images: usize::try_from(storage.max_images_per_submission).unwrap_or(usize::MAX),
            max_bytes_per_image: usize::try_from(storage.max_upload_size_mb.saturating_mul(1024 * 1024))
                .unwrap_or(usize::MAX),
        }
    }

    /// Whole-body cap handed to axum's body limit.
    pub(crate) fn max_body_bytes(&self) -> usize {
        self.max_images
            .saturating_mul(self.max_bytes_per_image)
            .saturating_add(1024 * 1024)
    }
}

pub(crate) fn validate_image_content_type(
    filename: Option<&str>,
    content_type: Option<&str>,
) -> Result<String, ApiError> {
    let mime = content_type.unwrap_or("").trim().to_ascii_lowercase();
    if mime.starts_with("image/") {
        Ok(mime)
    } else {
        Err(ApiError::BadRequest(format!(
            "File {} is not an image (content type '{mime}')",
            filename.unwrap_or("<unnamed>")
        )))
    }
}

pub(crate) fn validate_dimension_value(name: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("Field '{name}' must not be empty")));
    }
    if value.contains('/') {
        return Err(ApiError::BadRequest(format!("Field '{name}' must not contain '/'")));
    }
    Ok(())
}
