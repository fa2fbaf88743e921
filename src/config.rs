//! Batch configuration.
//!
//! A [`ReelConfig`] is built once (defaults, JSON file, then CLI overrides), validated, and then
//! shared read-only for the whole batch.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::{FrameRate, Viewport};
use crate::foundation::error::{ReelError, ReelResult};

/// How a page is turned into video.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Frame-by-frame screenshots under a controlled animation clock.
    #[default]
    Frames,
    /// Continuous wall-clock screencast of an emulated device, trimmed afterwards.
    Stream,
}

/// Batch error policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// First failure aborts the batch; no further groups start.
    #[default]
    Abort,
    /// Failures are recorded per item and the batch always completes.
    Continue,
}

/// Device emulated by stream-mode contexts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub user_agent: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            width: 390,
            height: 844,
            device_scale_factor: 3.0,
            mobile: true,
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 14_2 like Mac OS X) \
                AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1"
                .to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub warmup_navigation_ms: u64,
    pub warmup_settle_ms: u64,
    pub navigation_ms: u64,
    pub stream_navigation_ms: u64,
    pub screenshot_ms: u64,
    pub advance_ms: u64,
    pub readiness_max_wait_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            warmup_navigation_ms: 60_000,
            warmup_settle_ms: 2_000,
            navigation_ms: 30_000,
            stream_navigation_ms: 15_000,
            screenshot_ms: 60_000,
            advance_ms: 10_000,
            readiness_max_wait_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessOpts {
    /// Poll interval once the recording path is known.
    pub poll_interval_ms: u64,
    /// Faster interval used while the path has not appeared yet.
    pub pending_interval_ms: u64,
    /// Consecutive unchanged size observations required.
    pub stable_polls: u32,
}

impl Default for ReadinessOpts {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            pending_interval_ms: 500,
            stable_polls: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimOpts {
    /// Added to the computed front trim so the window starts inside steady-state content.
    pub safety_margin_secs: f64,
    /// Front trim used when the recording duration cannot be probed.
    pub fallback_start_secs: f64,
}

impl Default for TrimOpts {
    fn default() -> Self {
        Self {
            safety_margin_secs: 1.0,
            fallback_start_secs: 3.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory the published files are copied into.
    pub root: PathBuf,
    /// Public URL prefix under which `root` is served.
    pub base_url: String,
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./tmp/public"),
            base_url: "http://localhost:3000".to_owned(),
            key_prefix: "converted-videos/".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelConfig {
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub max_concurrent: usize,
    pub default_duration_secs: f64,
    pub frame_rate: FrameRate,
    pub mode: CaptureMode,
    pub on_error: OnError,
    pub viewport: Viewport,
    pub device: DeviceProfile,
    pub timeouts: Timeouts,
    pub readiness: ReadinessOpts,
    pub trim: TrimOpts,
    pub blocked_url_patterns: Vec<String>,
    pub source_marker: String,
    pub video_extensions: Vec<String>,
    pub store: StoreConfig,
    /// Prefix of the local URL handed out when publishing fails.
    pub fallback_base_url: String,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ReelConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./tmp/converted-videos"),
            work_dir: PathBuf::from("./tmp/recordings"),
            max_concurrent: 2,
            default_duration_secs: 10.0,
            frame_rate: FrameRate::default(),
            mode: CaptureMode::default(),
            on_error: OnError::default(),
            viewport: Viewport::default(),
            device: DeviceProfile::default(),
            timeouts: Timeouts::default(),
            readiness: ReadinessOpts::default(),
            trim: TrimOpts::default(),
            blocked_url_patterns: [
                "*favicon*",
                "*apple-touch-icon*",
                "*android-chrome*",
                "*mstile-*",
                "*browserconfig.xml*",
                "*manifest.json*",
                "*.ico",
                "*/icon-*",
                "*/apple-icon*",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            source_marker: "magicpatterns.app".to_owned(),
            video_extensions: vec![".mp4".to_owned(), ".webm".to_owned()],
            store: StoreConfig::default(),
            fallback_base_url: "http://localhost:3000".to_owned(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl ReelConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            ReelError::validation(format!("invalid config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.max_concurrent == 0 {
            return Err(ReelError::validation("max_concurrent must be >= 1"));
        }
        if !self.default_duration_secs.is_finite() || self.default_duration_secs <= 0.0 {
            return Err(ReelError::validation(
                "default_duration_secs must be a positive number",
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ReelError::validation("viewport width/height must be non-zero"));
        }
        if self.device.width == 0 || self.device.height == 0 {
            return Err(ReelError::validation("device width/height must be non-zero"));
        }
        if self.readiness.stable_polls == 0 {
            return Err(ReelError::validation("readiness.stable_polls must be >= 1"));
        }
        if self.readiness.poll_interval_ms == 0 || self.readiness.pending_interval_ms == 0 {
            return Err(ReelError::validation(
                "readiness poll intervals must be non-zero",
            ));
        }
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.trim.safety_margin_secs) || !non_negative(self.trim.fallback_start_secs)
        {
            return Err(ReelError::validation(
                "trim offsets must be non-negative numbers",
            ));
        }
        Ok(())
    }

    /// `true` when `src` already points at a video file.
    pub fn is_video_source(&self, src: &str) -> bool {
        let lower = src.to_ascii_lowercase();
        self.video_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}
