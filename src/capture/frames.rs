use std::time::Duration;

use crate::browser::PageDriver;
use crate::capture::sink::{FrameSet, FrameSink, SinkConfig};
use crate::foundation::core::{FrameIndex, FrameRate};
use crate::foundation::error::{ReelError, ReelResult};
use crate::time::TimeController;

/// Strictly alternates `advance` and screenshot so frame `i` shows exactly
/// `(i + 1) * 1000 / fps` ms of animation time.
#[derive(Clone, Copy, Debug)]
pub struct FrameCapturer {
    screenshot_timeout: Duration,
}

impl FrameCapturer {
    pub fn new(screenshot_timeout: Duration) -> Self {
        Self { screenshot_timeout }
    }

    /// Capture `frame_count` frames into a fresh [`FrameSet`].
    pub async fn capture(
        &self,
        page: &dyn PageDriver,
        clock: &mut dyn TimeController,
        frame_count: u64,
        frame_rate: FrameRate,
    ) -> ReelResult<FrameSet> {
        let mut set = FrameSet::new();
        self.capture_into(page, clock, frame_count, frame_rate, &mut set)
            .await?;
        Ok(set)
    }

    /// Capture into any sink. The first failing frame aborts the loop; nothing after it is pushed.
    pub async fn capture_into(
        &self,
        page: &dyn PageDriver,
        clock: &mut dyn TimeController,
        frame_count: u64,
        frame_rate: FrameRate,
        sink: &mut dyn FrameSink,
    ) -> ReelResult<()> {
        let interval_ms = frame_rate.frame_interval_ms();
        let strategy = clock.strategy();
        sink.begin(SinkConfig {
            frame_count,
            frame_rate,
        })?;

        for i in 0..frame_count {
            let now_ms = clock.advance(interval_ms).await.map_err(|e| {
                tracing::warn!(frame = i, ?strategy, "clock advance failed");
                e
            })?;
            let png = page
                .screenshot_png(self.screenshot_timeout)
                .await
                .map_err(|e| ReelError::frame(i, e.to_string()))?;
            sink.push_frame(FrameIndex(i), png)?;
            if i % 30 == 0 {
                let expected_ms = frame_rate.frame_time_ms(FrameIndex(i + 1));
                tracing::debug!(frame = i, of = frame_count, now_ms, expected_ms, "frame captured");
            }
        }

        sink.end()
    }
}
