//! One capture, end to end: warm-up, capture, assembly, publishing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{
    BrowserEngine, BrowsingContext, ContextOptions, PageDriver, RecordVideo, WaitUntil,
};
use crate::capture::frames::FrameCapturer;
use crate::capture::readiness::FileReadinessWaiter;
use crate::capture::sink::FrameSet;
use crate::capture::stream::StreamRecorder;
use crate::config::{CaptureMode, ReelConfig};
use crate::encode::{AssembledVideo, Encoder, VideoAssembler};
use crate::foundation::error::{ErrorKind, ReelError, ReelResult};
use crate::model::{CaptureRequest, SessionOutput};
use crate::store::Store;
use crate::time::{ClockStrategy, clock_for};

/// Collaborators shared by every session of a batch.
#[derive(Clone)]
pub struct SessionDeps {
    pub engine: Arc<dyn BrowserEngine>,
    pub encoder: Arc<dyn Encoder>,
    pub store: Arc<dyn Store>,
    pub config: Arc<ReelConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    WarmingUp,
    Capturing,
    Assembling,
    Publishing,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Per-request state machine:
/// `Idle → WarmingUp → Capturing → Assembling → Publishing → Done`, or `Failed` from any
/// non-terminal state.
///
/// A session owns the browsing contexts it opens and closes them on every path. There is no
/// whole-session retry; the only retries are the clock fallback here and the container fallback
/// in [`VideoAssembler`].
pub struct CaptureSession<'a> {
    req: &'a CaptureRequest,
    deps: &'a SessionDeps,
    transitions: Vec<SessionState>,
    clock: Option<ClockStrategy>,
}

impl<'a> CaptureSession<'a> {
    pub fn new(req: &'a CaptureRequest, deps: &'a SessionDeps) -> Self {
        Self {
            req,
            deps,
            transitions: vec![SessionState::Idle],
            clock: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(SessionState::Idle)
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[SessionState] {
        &self.transitions
    }

    /// Clock strategy that produced the frames, once a frame capture succeeded.
    pub fn clock_strategy(&self) -> Option<ClockStrategy> {
        self.clock
    }

    fn enter(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state(), to = ?next, "session transition");
        self.transitions.push(next);
    }

    fn cfg(&self) -> &ReelConfig {
        &self.deps.config
    }

    #[tracing::instrument(
        name = "session",
        skip_all,
        fields(output_id = %self.req.output_id(), url = %self.req.source_url())
    )]
    pub async fn run(&mut self) -> ReelResult<SessionOutput> {
        if self.state() != SessionState::Idle {
            return Err(ReelError::validation("capture session can only run once"));
        }
        match self.drive().await {
            Ok(out) => {
                self.enter(SessionState::Done);
                tracing::info!(asset_url = %out.asset_url, published = out.published, "session done");
                Ok(out)
            }
            Err(e) => {
                tracing::warn!(state = ?self.state(), error = %e, "session failed");
                self.enter(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> ReelResult<SessionOutput> {
        self.enter(SessionState::WarmingUp);
        self.warm_up().await?;

        self.enter(SessionState::Capturing);
        let assembled = match self.cfg().mode {
            CaptureMode::Frames => {
                let frames = self.capture_frames().await?;
                self.enter(SessionState::Assembling);
                self.assembler()
                    .assemble_frames(&frames, self.req.frame_rate(), self.req.output_id())
                    .await?
            }
            CaptureMode::Stream => self.capture_stream().await?,
        };
        tracing::info!(path = %assembled.path.display(), outcome = ?assembled.outcome, "assembled");

        self.enter(SessionState::Publishing);
        Ok(self.publish(assembled).await)
    }

    fn assembler(&self) -> VideoAssembler {
        let cfg = self.cfg();
        VideoAssembler::new(
            self.deps.encoder.clone(),
            cfg.output_dir.clone(),
            cfg.trim.clone(),
        )
    }

    /// Load the page once in a throwaway context so the timed capture starts with warm assets.
    async fn warm_up(&self) -> ReelResult<()> {
        let cfg = self.cfg();
        let ctx = self
            .deps
            .engine
            .new_context(ContextOptions {
                viewport: Some(cfg.viewport),
                ..ContextOptions::default()
            })
            .await?;
        let result = match ctx.new_page().await {
            Ok(page) => {
                let loaded = self.warm_page(page.as_ref()).await;
                close_page(page).await;
                loaded
            }
            Err(e) => Err(e),
        };
        close_context(ctx).await;
        result
    }

    async fn warm_page(&self, page: &dyn PageDriver) -> ReelResult<()> {
        let cfg = self.cfg();
        page.block_urls(&cfg.blocked_url_patterns).await?;
        page.goto(
            self.req.source_url(),
            WaitUntil::NetworkIdle,
            Duration::from_millis(cfg.timeouts.warmup_navigation_ms),
        )
        .await?;
        tokio::time::sleep(Duration::from_millis(cfg.timeouts.warmup_settle_ms)).await;
        tracing::debug!("warm-up complete");
        Ok(())
    }

    async fn capture_frames(&mut self) -> ReelResult<FrameSet> {
        let ctx = self
            .deps
            .engine
            .new_context(ContextOptions {
                viewport: Some(self.cfg().viewport),
                ..ContextOptions::default()
            })
            .await?;
        let result = self.capture_with_fallback(ctx.as_ref()).await;
        close_context(ctx).await;
        result
    }

    /// Capture under virtual time; on failure retry once with the script clock on a fresh page.
    async fn capture_with_fallback(&mut self, ctx: &dyn BrowsingContext) -> ReelResult<FrameSet> {
        let mut strategy = ClockStrategy::VirtualTime;
        loop {
            let page = ctx.new_page().await?;
            let attempt = self.capture_on_page(page.as_ref(), strategy).await;
            close_page(page).await;
            match attempt {
                Ok(frames) => {
                    self.clock = Some(strategy);
                    return Ok(frames);
                }
                Err(e) if e.kind() != ErrorKind::Navigation => match strategy.fallback() {
                    Some(next) => {
                        tracing::warn!(
                            failed = ?strategy,
                            retry = ?next,
                            error = %e,
                            "capture failed, retrying on a fresh page"
                        );
                        strategy = next;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn capture_on_page(
        &self,
        page: &dyn PageDriver,
        strategy: ClockStrategy,
    ) -> ReelResult<FrameSet> {
        let cfg = self.cfg();
        page.goto(
            self.req.source_url(),
            WaitUntil::DomContentLoaded,
            Duration::from_millis(cfg.timeouts.navigation_ms),
        )
        .await?;

        let mut clock = clock_for(
            strategy,
            page,
            Duration::from_millis(cfg.timeouts.advance_ms),
        );
        let frame_count = self.req.frame_count()?;
        tracing::info!(?strategy, frame_count, fps = %self.req.frame_rate(), "capturing frames");
        FrameCapturer::new(Duration::from_millis(cfg.timeouts.screenshot_ms))
            .capture(page, clock.as_mut(), frame_count, self.req.frame_rate())
            .await
    }

    async fn capture_stream(&mut self) -> ReelResult<AssembledVideo> {
        let cfg = self.deps.config.clone();
        let ctx = self
            .deps
            .engine
            .new_context(ContextOptions {
                viewport: None,
                device: Some(cfg.device.clone()),
                record_video: Some(RecordVideo {
                    dir: cfg.work_dir.clone(),
                    width: cfg.device.width,
                    height: cfg.device.height,
                }),
            })
            .await?;

        let recorder =
            StreamRecorder::new(Duration::from_millis(cfg.timeouts.stream_navigation_ms));
        let recorded = recorder
            .record(
                ctx.as_ref(),
                self.req.source_url(),
                Duration::from_secs_f64(self.req.target_duration_secs()),
            )
            .await;
        // Closing the context is what finalizes the recording.
        close_context(ctx).await;
        let recording = recorded?;

        let raw = FileReadinessWaiter::new(cfg.readiness.clone())
            .wait(
                recording.path.as_deref(),
                Duration::from_millis(cfg.timeouts.readiness_max_wait_ms),
            )
            .await?;
        tracing::info!(
            raw = %raw.display(),
            recorded_secs = recording.logical_duration.as_secs_f64(),
            target_secs = self.req.target_duration_secs(),
            "recording ready"
        );

        self.enter(SessionState::Assembling);
        let assembled = self
            .assembler()
            .assemble_recording(
                &raw,
                self.req.target_duration_secs(),
                self.req.output_id(),
            )
            .await;
        if !assembled.as_ref().is_ok_and(|a| a.path == raw) {
            remove_local(&raw).await;
        }
        assembled
    }

    /// Publish the final file. A store failure downgrades to a local fallback URL.
    async fn publish(&self, video: AssembledVideo) -> SessionOutput {
        let cfg = self.cfg();
        let filename = video
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.req.output_id().to_owned());
        let key = format!("{}{filename}", cfg.store.key_prefix);

        match self.deps.store.put(&video.path, &key).await {
            Ok(asset_url) => {
                remove_local(&video.path).await;
                SessionOutput {
                    local_path: video.path,
                    asset_url,
                    published: true,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, key, "publish failed, keeping local file");
                SessionOutput {
                    local_path: video.path,
                    asset_url: format!(
                        "{}/{filename}",
                        cfg.fallback_base_url.trim_end_matches('/')
                    ),
                    published: false,
                }
            }
        }
    }
}

async fn close_page(page: Box<dyn PageDriver>) {
    if let Err(e) = page.close().await {
        tracing::debug!(error = %e, "page close failed");
    }
}

async fn close_context(ctx: Box<dyn BrowsingContext>) {
    if let Err(e) = ctx.close().await {
        tracing::warn!(error = %e, "browsing context close failed");
    }
}

async fn remove_local(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "failed to remove local file");
    }
}
