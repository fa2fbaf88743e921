use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::browser::{BrowsingContext, PageDriver, WaitUntil};
use crate::foundation::error::{ReelError, ReelResult};

/// A continuously recorded session, finalized asynchronously after its context closes.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecording {
    /// Where the recorder writes; the file may not exist or may still grow.
    pub path: Option<PathBuf>,
    /// Wall-clock time between navigation and stop.
    pub logical_duration: Duration,
}

/// Live recording started by [`StreamRecorder::start`].
pub struct StreamHandle {
    page: Box<dyn PageDriver>,
    started: Instant,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("video_path", &self.page.video_path())
            .field("started", &self.started)
            .finish()
    }
}

/// Wall-clock recording in a context created with `record_video`.
#[derive(Clone, Copy, Debug)]
pub struct StreamRecorder {
    navigation_timeout: Duration,
}

impl StreamRecorder {
    pub fn new(navigation_timeout: Duration) -> Self {
        Self { navigation_timeout }
    }

    /// Open a page in the recording context and load `url`.
    pub async fn start(&self, ctx: &dyn BrowsingContext, url: &str) -> ReelResult<StreamHandle> {
        let page = ctx.new_page().await?;
        if let Err(e) = page
            .goto(url, WaitUntil::DomContentLoaded, self.navigation_timeout)
            .await
        {
            let _ = page.close().await;
            return Err(ReelError::navigation(format!(
                "failed to navigate during recording {url}: {e}"
            )));
        }
        Ok(StreamHandle {
            page,
            started: Instant::now(),
        })
    }

    /// Stop recording. The file is only complete after the owning context is closed.
    pub async fn stop(&self, handle: StreamHandle) -> ReelResult<RawRecording> {
        let logical_duration = handle.started.elapsed();
        let path = handle.page.video_path();
        if let Err(e) = handle.page.close().await {
            tracing::debug!(error = %e, "recording page close failed");
        }
        if path.is_none() {
            return Err(ReelError::capture("video recording failed: page has no recording"));
        }
        Ok(RawRecording {
            path,
            logical_duration,
        })
    }

    /// `start`, record for `duration` of wall-clock time, then `stop`.
    pub async fn record(
        &self,
        ctx: &dyn BrowsingContext,
        url: &str,
        duration: Duration,
    ) -> ReelResult<RawRecording> {
        let handle = self.start(ctx, url).await?;
        tracing::info!(url, secs = duration.as_secs_f64(), "recording");
        tokio::time::sleep(duration).await;
        self.stop(handle).await
    }
}
