use crate::services::errors::PipelineError;

/// Returns the text strictly between the two occurrences of `sentinel`.
/// Any other occurrence count is an `ExtractionError`.
pub fn extract(reply: &str, sentinel: &str) -> Result<String, PipelineError> {
    if sentinel.is_empty() {
        return Err(PipelineError::Extraction("sentinel must not be empty".to_string()));
    }

    let parts: Vec<&str> = reply.split(sentinel).collect();
    match parts.as_slice() {
        [_, marked, _] => Ok((*marked).to_string()),
        _ => Err(PipelineError::Extraction(format!(
            "expected sentinel '{sentinel}' exactly twice, found {} occurrence(s)",
            parts.len() - 1
        ))),
    }
}
