use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::services::paths::PathError;

/// Failures of a single pipeline step. The display form always starts with
/// the kind name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("DecodeError: {0}")]
    Decode(String),
    #[error("UploadError: {0}")]
    Upload(String),
    #[error("RecognitionError: {0}")]
    Recognition(String),
    #[error("ExtractionError: {0}")]
    Extraction(String),
    #[error("ModelServiceError: {0}")]
    ModelService(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DecodeError",
            Self::Upload(_) => "UploadError",
            Self::Recognition(_) => "RecognitionError",
            Self::Extraction(_) => "ExtractionError",
            Self::ModelService(_) => "ModelServiceError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStep {
    Upload,
    Decode,
    Recognition,
}

impl BatchStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Decode => "decode",
            Self::Recognition => "recognition",
        }
    }

    /// Error for an image whose time limit elapsed during this step.
    pub fn timed_out(self, limit: Duration) -> PipelineError {
        let message = format!("image processing exceeded {}s", limit.as_secs_f64());
        match self {
            Self::Upload => PipelineError::Upload(message),
            Self::Decode => PipelineError::Decode(message),
            Self::Recognition => PipelineError::Recognition(message),
        }
    }
}

impl fmt::Display for BatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch either fully succeeds or reports exactly one of these.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("submission contains no images")]
    Empty,
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("image {index} failed during {step}: {source}")]
    Image {
        index: usize,
        step: BatchStep,
        #[source]
        source: PipelineError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_failure_names_index_step_and_kind() {
        let err = BatchError::Image {
            index: 2,
            step: BatchStep::Recognition,
            source: PipelineError::Recognition("engine offline".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "image 2 failed during recognition: RecognitionError: engine offline"
        );
    }

    #[test]
    fn timeout_error_kind_follows_the_step() {
        let limit = Duration::from_millis(1500);
        assert_eq!(
            BatchStep::Upload.timed_out(limit),
            PipelineError::Upload("image processing exceeded 1.5s".to_string())
        );
        assert_eq!(BatchStep::Decode.timed_out(limit).kind(), "DecodeError");
        assert_eq!(BatchStep::Recognition.timed_out(limit).kind(), "RecognitionError");
    }

    #[test]
    fn kind_matches_display_prefix() {
        let errors = [
            PipelineError::Decode("x".into()),
            PipelineError::Upload("x".into()),
            PipelineError::Recognition("x".into()),
            PipelineError::Extraction("x".into()),
            PipelineError::ModelService("x".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with(err.kind()), "got: {err}");
        }
    }
}
