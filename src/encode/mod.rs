//! Turning frames and raw recordings into final video files.
//!
//! [`Encoder`] is the narrow seam over the actual codec tooling; [`VideoAssembler`] owns the
//! trimming policy and the container fallback chain on top of it.

use std::path::Path;

use async_trait::async_trait;

use crate::capture::sink::FrameSet;
use crate::foundation::core::FrameRate;
use crate::foundation::error::ReelResult;

/// Frame-set and recording assembly with fallbacks.
pub mod assemble;
/// `ffmpeg`/`ffprobe` subprocess encoder.
pub mod ffmpeg;
/// Parsers for probe output.
pub mod probe;

pub use assemble::{AssembledVideo, AssemblyOutcome, TrimPlan, VideoAssembler, plan_trim};
pub use ffmpeg::FfmpegEncoder;

/// Output container. Each container implies a fixed codec profile per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// H.264 (CRF 18, yuv420p) in MP4 with `+faststart`.
    Mp4,
    /// VP8 for frame encodes; stream copy for trims.
    Webm,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

/// Window kept from a recording, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrimWindow {
    pub start_secs: f64,
    pub duration_secs: f64,
}

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode PNG frames at `frame_rate` into `out`.
    async fn encode_frames(
        &self,
        frames: &FrameSet,
        frame_rate: FrameRate,
        container: Container,
        out: &Path,
    ) -> ReelResult<()>;

    /// Real media duration of `input` in seconds.
    async fn probe_duration(&self, input: &Path) -> ReelResult<f64>;

    /// Write `window` of `input` into `out`.
    async fn trim(
        &self,
        input: &Path,
        window: TrimWindow,
        container: Container,
        out: &Path,
    ) -> ReelResult<()>;

    /// Byte-identical copy.
    async fn copy(&self, input: &Path, out: &Path) -> ReelResult<()> {
        ffmpeg::ensure_parent_dir(out)?;
        tokio::fs::copy(input, out).await.map_err(|e| {
            crate::foundation::error::ReelError::assembly(format!(
                "failed to copy '{}' to '{}': {e}",
                input.display(),
                out.display()
            ))
        })?;
        Ok(())
    }
}
