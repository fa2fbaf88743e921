use crate::foundation::error::{ReelError, ReelResult};

/// 0-based index of a captured frame.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Nominal capture/encode rate in whole frames per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub struct FrameRate(u32);

impl FrameRate {
    /// Create a validated frame rate.
    pub fn new(fps: u32) -> ReelResult<Self> {
        if fps == 0 {
            return Err(ReelError::validation("frame rate must be > 0"));
        }
        Ok(Self(fps))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Frame budget: milliseconds of animation time between two consecutive frames.
    ///
    /// Kept fractional so that frame `n` always sits at exactly `n * 1000 / fps` ms.
    pub fn frame_interval_ms(self) -> f64 {
        1000.0 / f64::from(self.0)
    }

    /// Number of frames covering `duration_secs` at this rate.
    pub fn frame_count(self, duration_secs: f64) -> ReelResult<u64> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(ReelError::validation(format!(
                "duration must be a positive number of seconds, got {duration_secs}"
            )));
        }
        let frames = (duration_secs * f64::from(self.0)).round();
        if frames < 1.0 {
            return Err(ReelError::validation(format!(
                "duration {duration_secs}s is shorter than one frame at {} fps",
                self.0
            )));
        }
        Ok(frames as u64)
    }

    /// Timestamp (ms) of frame `idx` on the animation clock.
    pub fn frame_time_ms(self, idx: FrameIndex) -> f64 {
        idx.0 as f64 * self.frame_interval_ms()
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = ReelError;

    fn try_from(fps: u32) -> ReelResult<Self> {
        Self::new(fps)
    }
}

impl From<FrameRate> for u32 {
    fn from(fps: FrameRate) -> Self {
        fps.0
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self(30)
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Viewport size in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

/// Format seconds as `HH:MM:SS.mmm`, the timestamp syntax `ffmpeg -ss` accepts.
pub fn format_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
