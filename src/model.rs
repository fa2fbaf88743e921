//! Request/result records exchanged between the batch layer and capture sessions.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::foundation::core::FrameRate;
use crate::foundation::error::{ErrorKind, ReelError, ReelResult};

/// One unit of work. Immutable once built; deserializing runs the same checks as [`Self::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCaptureRequest")]
pub struct CaptureRequest {
    source_url: String,
    target_duration_secs: f64,
    frame_rate: FrameRate,
    output_id: String,
}

impl CaptureRequest {
    pub fn new(
        source_url: impl Into<String>,
        target_duration_secs: f64,
        frame_rate: FrameRate,
        output_id: impl Into<String>,
    ) -> ReelResult<Self> {
        let source_url = source_url.into();
        let output_id = output_id.into();
        url::Url::parse(&source_url).map_err(|e| {
            ReelError::validation(format!("invalid source url '{source_url}': {e}"))
        })?;
        if output_id.is_empty() {
            return Err(ReelError::validation("output identifier must be non-empty"));
        }
        frame_rate.frame_count(target_duration_secs)?;
        Ok(Self {
            source_url,
            target_duration_secs,
            frame_rate,
            output_id,
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn target_duration_secs(&self) -> f64 {
        self.target_duration_secs
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    /// Exact number of frames a frame-mode capture must produce.
    pub fn frame_count(&self) -> ReelResult<u64> {
        self.frame_rate.frame_count(self.target_duration_secs)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCaptureRequest {
    source_url: String,
    target_duration_secs: f64,
    frame_rate: FrameRate,
    output_id: String,
}

impl TryFrom<RawCaptureRequest> for CaptureRequest {
    type Error = ReelError;

    fn try_from(raw: RawCaptureRequest) -> ReelResult<Self> {
        Self::new(
            raw.source_url,
            raw.target_duration_secs,
            raw.frame_rate,
            raw.output_id,
        )
    }
}

/// Outcome of one request. Produced once and never edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub output_id: String,
    pub source_url: String,
    pub success: bool,
    pub asset_url: Option<String>,
    /// `false` when `asset_url` is the local fallback reference.
    pub published: bool,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<ErrorKind>,
    /// Wall-clock time spent on the request, e.g. `"12s"`.
    pub duration: String,
    pub processed_at: DateTime<Utc>,
}

impl CaptureResult {
    pub fn succeeded(
        req: &CaptureRequest,
        asset_url: String,
        published: bool,
        elapsed: std::time::Duration,
    ) -> Self {
        Self {
            output_id: req.output_id.clone(),
            source_url: req.source_url.clone(),
            success: true,
            asset_url: Some(asset_url),
            published,
            failure_reason: None,
            failure_kind: None,
            duration: format_elapsed(elapsed),
            processed_at: Utc::now(),
        }
    }

    pub fn failed(req: &CaptureRequest, err: &ReelError, elapsed: std::time::Duration) -> Self {
        Self {
            output_id: req.output_id.clone(),
            source_url: req.source_url.clone(),
            success: false,
            asset_url: None,
            published: false,
            failure_reason: Some(err.to_string()),
            failure_kind: Some(err.kind()),
            duration: format_elapsed(elapsed),
            processed_at: Utc::now(),
        }
    }
}

/// Aggregate outcome of a batch, built once all results are known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<CaptureResult>,
}

impl BatchReport {
    pub fn from_results(results: Vec<CaptureResult>, elapsed: std::time::Duration) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            elapsed_secs: elapsed.as_secs_f64(),
            completed_at: Utc::now(),
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Batch input file: `{ "urls": [...], "duration": 10, "outputDir": "..." }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl BatchInput {
    pub fn from_path(path: &std::path::Path) -> ReelResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file '{}'", path.display()))?;
        let input: Self = serde_json::from_str(&text).map_err(|e| {
            ReelError::validation(format!("invalid input file '{}': {e}", path.display()))
        })?;
        if input.urls.is_empty() {
            return Err(ReelError::validation(format!(
                "input file '{}' lists no urls",
                path.display()
            )));
        }
        Ok(input)
    }
}

/// Where a finished session left its video.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOutput {
    pub local_path: PathBuf,
    pub asset_url: String,
    pub published: bool,
}

pub(crate) fn format_elapsed(elapsed: std::time::Duration) -> String {
    format!("{}s", elapsed.as_secs_f64().round() as u64)
}

/// Derive a file-safe identifier from a source URL.
///
/// The scheme is dropped and every character outside `[A-Za-z0-9.-]` becomes `-`.
pub fn output_id_for_url(source_url: &str) -> String {
    let stripped = source_url
        .strip_prefix("https://")
        .or_else(|| source_url.strip_prefix("http://"))
        .unwrap_or(source_url);
    let id: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = id.trim_matches('-');
    if id.is_empty() {
        "capture".to_owned()
    } else {
        id.to_owned()
    }
}

/// Build requests for a list of URLs, suffixing repeated identifiers with `-2`, `-3`, ...
///
/// Identifiers are unique across the batch, including against suffixed ones already issued.
pub fn requests_for_urls(
    urls: &[String],
    duration_secs: f64,
    frame_rate: FrameRate,
) -> ReelResult<Vec<CaptureRequest>> {
    let mut issued = HashSet::<String>::new();
    urls.iter()
        .map(|url| {
            let base = output_id_for_url(url);
            let mut id = base.clone();
            let mut n = 1;
            while issued.contains(&id) {
                n += 1;
                id = format!("{base}-{n}");
            }
            issued.insert(id.clone());
            CaptureRequest::new(url.clone(), duration_secs, frame_rate, id)
        })
        .collect()
}

#[cfg(test)]
#[path = "../tests/unit/model.rs"]
mod tests;
