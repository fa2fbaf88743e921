//! Caller-facing outcome records: the API-style response and the results file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encode::ffmpeg::ensure_parent_dir;
use crate::foundation::error::{ReelError, ReelResult};
use crate::model::{BatchReport, CaptureResult};

/// File written next to a batch input file.
pub const RESULTS_FILE_NAME: &str = "conversion-results.json";

/// Structured outcome of a conversion call. Failures are reported in-band, never as an `Err`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub success: bool,
    pub total_processed: usize,
    pub successful_conversions: usize,
    pub failed_conversions: usize,
    pub video_urls: Vec<String>,
    pub results: Vec<CaptureResult>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionResponse {
    pub fn from_outcome(outcome: &ReelResult<BatchReport>) -> Self {
        match outcome {
            Ok(report) => {
                let video_urls = report
                    .results
                    .iter()
                    .filter(|r| r.success)
                    .filter_map(|r| r.asset_url.clone())
                    .collect();
                Self {
                    success: report.all_succeeded(),
                    total_processed: report.total,
                    successful_conversions: report.successful,
                    failed_conversions: report.failed,
                    video_urls,
                    results: report.results.clone(),
                    message: format!(
                        "converted {} of {} in {:.1}s",
                        report.successful, report.total, report.elapsed_secs
                    ),
                    error: None,
                }
            }
            Err(e) => Self {
                success: false,
                total_processed: 0,
                successful_conversions: 0,
                failed_conversions: 0,
                video_urls: Vec::new(),
                results: Vec::new(),
                message: "conversion aborted".to_owned(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// One row of `conversion-results.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ResultsEntry {
    fn from_result(r: &CaptureResult) -> Self {
        if r.success {
            Self {
                original_url: Some(r.source_url.clone()),
                video_url: r.asset_url.clone(),
                filename: r.asset_url.as_deref().and_then(url_filename),
                success: true,
                error: None,
                processed_at: None,
            }
        } else {
            Self {
                original_url: Some(r.source_url.clone()),
                video_url: None,
                filename: None,
                success: false,
                error: r.failure_reason.clone(),
                processed_at: Some(r.processed_at),
            }
        }
    }

    /// Single-row file written when a fail-fast batch aborted.
    pub fn aborted(err: &ReelError) -> Self {
        Self {
            original_url: None,
            video_url: None,
            filename: None,
            success: false,
            error: Some(err.to_string()),
            processed_at: Some(Utc::now()),
        }
    }
}

fn url_filename(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Rows for a finished batch, in request order.
pub fn results_entries(report: &BatchReport) -> Vec<ResultsEntry> {
    report.results.iter().map(ResultsEntry::from_result).collect()
}

/// `conversion-results.json` in the directory of `input`.
pub fn results_path_for(input: &Path) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(RESULTS_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(RESULTS_FILE_NAME))
}

pub fn write_results_file(path: &Path, entries: &[ResultsEntry]) -> ReelResult<()> {
    use anyhow::Context as _;
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| ReelError::Other(anyhow::anyhow!("failed to serialize results: {e}")))?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write results file '{}'", path.display()))?;
    tracing::info!(path = %path.display(), rows = entries.len(), "results file written");
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/report.rs"]
mod tests;
