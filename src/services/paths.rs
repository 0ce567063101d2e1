//! Object-storage addressing for submissions.
//!
//! A [`PathSchema`] is an ordered list of `/`-separated segments, each holding
//! exactly one `{dimension}` placeholder with optional literal text around it,
//! e.g. `{year}/module_{module}/student_{student}/assignment_{assignment}`.
//! Rendering a schema against [`SubmissionDimensions`] gives the folder path;
//! every image of the batch lives at `folder/sample{i}.png` under it.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_PATH_SCHEMA: &str =
    "{year}/module_{module}/student_{student}/assignment_{assignment}";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("PathError: path schema is empty")]
    EmptySchema,
    #[error("PathError: segment '{0}' must contain exactly one {{name}} placeholder")]
    InvalidSegment(String),
    #[error("PathError: dimension '{0}' appears more than once in the schema")]
    DuplicateDimension(String),
    #[error("PathError: missing dimension '{0}'")]
    MissingDimension(String),
    #[error("PathError: dimension '{name}' has invalid value '{value}'")]
    InvalidValue { name: String, value: String },
    #[error("PathError: object key is empty")]
    EmptyKey,
    #[error("PathError: invalid storage base url '{0}'")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    prefix: String,
    name: String,
    suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSchema {
    segments: Vec<Segment>,
}

impl PathSchema {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let raw = raw.trim().trim_matches('/');
        if raw.is_empty() {
            return Err(PathError::EmptySchema);
        }

        let mut segments: Vec<Segment> = Vec::new();
        for part in raw.split('/') {
            let segment = parse_segment(part)?;
            if segments.iter().any(|existing| existing.name == segment.name) {
                return Err(PathError::DuplicateDimension(segment.name));
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|segment| segment.name.as_str())
    }

    pub fn references(&self, name: &str) -> bool {
        self.dimension_names().any(|candidate| candidate == name)
    }
}

impl fmt::Display for PathSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            if position > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}{{{}}}{}", segment.prefix, segment.name, segment.suffix)?;
        }
        Ok(())
    }
}

fn parse_segment(part: &str) -> Result<Segment, PathError> {
    let invalid = || PathError::InvalidSegment(part.to_string());

    let open = part.find('{').ok_or_else(invalid)?;
    let close = part.find('}').ok_or_else(invalid)?;
    if close < open || part[close + 1..].contains(['{', '}']) || part[..open].contains('}') {
        return Err(invalid());
    }

    let name = &part[open + 1..close];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }

    Ok(Segment {
        prefix: part[..open].to_string(),
        name: name.to_string(),
        suffix: part[close + 1..].to_string(),
    })
}

/// Named dimension values of one submission, e.g. `student = 42`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionDimensions(BTreeMap<String, String>);

impl SubmissionDimensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    schema: PathSchema,
}

impl PathResolver {
    pub fn new(schema: PathSchema) -> Self {
        Self { schema }
    }

    /// Folder shared by every image of the submission.
    pub fn folder(&self, dimensions: &SubmissionDimensions) -> Result<String, PathError> {
        let mut rendered = Vec::with_capacity(self.schema.segments.len());
        for segment in &self.schema.segments {
            let value = dimensions
                .get(&segment.name)
                .ok_or_else(|| PathError::MissingDimension(segment.name.clone()))?;
            validate_value(&segment.name, value)?;
            rendered.push(format!("{}{}{}", segment.prefix, value, segment.suffix));
        }
        Ok(rendered.join("/"))
    }

    pub fn resolve(
        &self,
        dimensions: &SubmissionDimensions,
        file_index: usize,
    ) -> Result<String, PathError> {
        Ok(object_key(&self.folder(dimensions)?, file_index))
    }
}

fn validate_value(name: &str, value: &str) -> Result<(), PathError> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed != value
        || value.contains(['/', '\\'])
        || value == "."
        || value == ".."
    {
        return Err(PathError::InvalidValue { name: name.to_string(), value: value.to_string() });
    }
    Ok(())
}

pub fn sample_file_name(file_index: usize) -> String {
    format!("sample{file_index}.png")
}

pub fn object_key(folder: &str, file_index: usize) -> String {
    format!("{folder}/{}", sample_file_name(file_index))
}

fn is_sample_file_name(segment: &str) -> bool {
    segment
        .strip_prefix("sample")
        .and_then(|rest| rest.strip_suffix(".png"))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Builds candidate public URLs for stored samples. The generated URLs are
/// not checked against the bucket.
#[derive(Debug, Clone)]
pub struct UrlGenerator {
    base: Url,
}

impl UrlGenerator {
    pub fn new(public_base_url: &str) -> Result<Self, PathError> {
        let base = Url::parse(public_base_url)
            .map_err(|_| PathError::InvalidBaseUrl(public_base_url.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(PathError::InvalidBaseUrl(public_base_url.to_string()));
        }
        Ok(Self { base })
    }

    /// Virtual-hosted style: `{scheme}://{bucket}.{endpoint host}[:port]`.
    pub fn for_bucket(endpoint: &str, bucket: &str) -> Result<Self, PathError> {
        let invalid = || PathError::InvalidBaseUrl(endpoint.to_string());
        let parsed = Url::parse(endpoint).map_err(|_| invalid())?;
        let host = parsed.host_str().ok_or_else(invalid)?;
        let port = parsed.port().map(|port| format!(":{port}")).unwrap_or_default();
        Self::new(&format!("{}://{bucket}.{host}{port}/", parsed.scheme()))
    }

    pub fn generate_urls(
        &self,
        file_count: usize,
        object_key: &str,
    ) -> Result<Vec<String>, PathError> {
        let mut segments: Vec<&str> =
            object_key.split('/').filter(|segment| !segment.is_empty()).collect();
        if segments.last().is_some_and(|last| is_sample_file_name(last)) {
            segments.pop();
        }
        if segments.is_empty() {
            return Err(PathError::EmptyKey);
        }

        let mut folder = self.base.clone();
        folder
            .path_segments_mut()
            .map_err(|_| PathError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(&segments);

        (1..=file_count)
            .map(|index| {
                let mut url = folder.clone();
                url.path_segments_mut()
                    .map_err(|_| PathError::InvalidBaseUrl(self.base.to_string()))?
                    .push(&sample_file_name(index));
                Ok(url.to_string())
            })
            .collect()
    }
}
