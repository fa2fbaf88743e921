//! Turning a live page into frames or a raw recording.

/// Frame-by-frame capture under a controlled clock.
pub mod frames;
/// Waiting for asynchronously flushed recordings.
pub mod readiness;
/// Frame sink contract and the in-memory [`FrameSet`](sink::FrameSet).
pub mod sink;
/// Continuous wall-clock recording.
pub mod stream;
