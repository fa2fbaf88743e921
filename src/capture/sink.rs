use crate::foundation::core::{FrameIndex, FrameRate};
use crate::foundation::error::{ReelError, ReelResult};

/// Provided to a [`FrameSink`] before the first frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SinkConfig {
    /// Exact number of frames that will be pushed.
    pub frame_count: u64,
    pub frame_rate: FrameRate,
}

/// Consumer of captured frames.
///
/// Ordering contract: `push_frame` is called with indices `0..frame_count` in strictly increasing
/// order, and `end` only after the last one.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()>;
    /// Push one encoded (PNG) frame.
    fn push_frame(&mut self, idx: FrameIndex, png: Vec<u8>) -> ReelResult<()>;
    fn end(&mut self) -> ReelResult<()>;
}

/// Ordered in-memory frames of one capture.
///
/// The set is only complete when it holds exactly the announced number of frames; a short set is
/// an error, never padded.
#[derive(Debug, Default)]
pub struct FrameSet {
    cfg: Option<SinkConfig>,
    frames: Vec<Vec<u8>>,
    finished: bool,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.cfg.map(|c| c.frame_rate)
    }

    /// `true` after `end` accepted an exact-length set.
    pub fn is_complete(&self) -> bool {
        self.finished
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }
}

impl FrameSink for FrameSet {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.frame_count == 0 {
            return Err(ReelError::validation("frame set needs at least one frame"));
        }
        self.frames.clear();
        self.frames.reserve(cfg.frame_count.min(4096) as usize);
        self.cfg = Some(cfg);
        self.finished = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, png: Vec<u8>) -> ReelResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| ReelError::capture("frame set not started"))?;
        if idx.0 != self.frames.len() as u64 {
            return Err(ReelError::frame(
                idx.0,
                format!("out-of-order frame, expected index {}", self.frames.len()),
            ));
        }
        if idx.0 >= cfg.frame_count {
            return Err(ReelError::frame(
                idx.0,
                format!("frame beyond announced count {}", cfg.frame_count),
            ));
        }
        if png.is_empty() {
            return Err(ReelError::frame(idx.0, "empty image buffer"));
        }
        self.frames.push(png);
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| ReelError::capture("frame set not started"))?;
        if self.frames.len() as u64 != cfg.frame_count {
            return Err(ReelError::capture(format!(
                "frame set is short: {} of {} frames",
                self.frames.len(),
                cfg.frame_count
            )));
        }
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/capture/sink.rs"]
mod tests;
