//! Chrome over the DevTools Protocol (chromiumoxide).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::cdp::browser_protocol::emulation::{
    EventVirtualTimeBudgetExpired, SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams,
    SetUserAgentOverrideParams, SetVirtualTimePolicyParams,
    VirtualTimePolicy as CdpVirtualTimePolicy,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, SetBlockedUrLsParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventDomContentEventFired, EventLoadEventFired,
    EventScreencastFrame, NavigateParams, ScreencastFrameAckParams, StartScreencastFormat,
    StartScreencastParams, StopScreencastParams,
};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::browser::{
    BrowserEngine, BrowsingContext, ContextOptions, PageDriver, RecordVideo, VirtualTimePolicy,
    WaitUntil,
};
use crate::config::{DeviceProfile, ReelConfig};
use crate::foundation::core::Viewport;
use crate::foundation::error::{ReelError, ReelResult};

/// Quiet period after `load` that counts as network idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

static RECORDING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Launch options for [`ChromiumEngine`].
#[derive(Clone, Debug)]
pub struct ChromiumOptions {
    /// Chrome/Chromium binary; autodetected when `None`.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub extra_args: Vec<String>,
    /// Encoder used for stream-mode recordings.
    pub ffmpeg: PathBuf,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            extra_args: Vec::new(),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl ChromiumOptions {
    pub fn from_config(cfg: &ReelConfig) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ..Self::default()
        }
    }
}

/// One shared browser process. Every context is an isolated CDP browser context.
pub struct ChromiumEngine {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    open_contexts: Arc<Mutex<Vec<BrowserContextId>>>,
    ffmpeg: PathBuf,
}

impl ChromiumEngine {
    pub async fn launch(opts: ChromiumOptions) -> ReelResult<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .args([
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--hide-scrollbars",
                "--mute-audio",
                "--autoplay-policy=no-user-gesture-required",
            ]);
        for arg in &opts.extra_args {
            builder = builder.arg(arg.as_str());
        }
        if let Some(exe) = &opts.executable {
            builder = builder.chrome_executable(exe);
        }
        if !opts.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| ReelError::Other(anyhow::anyhow!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ReelError::Other(anyhow::anyhow!("failed to launch browser: {e}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler error");
                }
            }
        });
        tracing::info!("browser launched");

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            open_contexts: Arc::new(Mutex::new(Vec::new())),
            ffmpeg: opts.ffmpeg,
        })
    }

    /// Dispose contexts that sessions left open, then close the browser.
    pub async fn shutdown(&self) {
        let leftover: Vec<BrowserContextId> = match self.open_contexts.lock() {
            Ok(mut ids) => ids.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for id in leftover {
            if let Err(e) = self
                .browser
                .execute(DisposeBrowserContextParams::new(id))
                .await
            {
                tracing::debug!(error = %e, "failed to dispose lingering context");
            }
        }
        if let Err(e) = self.browser.execute(CloseParams::default()).await {
            tracing::debug!(error = %e, "browser close failed");
        }
        self.handler.abort();
        tracing::info!("browser closed");
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn new_context(&self, opts: ContextOptions) -> ReelResult<Box<dyn BrowsingContext>> {
        let id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| ReelError::capture(format!("failed to create browsing context: {e}")))?
            .result
            .browser_context_id;
        if let Ok(mut ids) = self.open_contexts.lock() {
            ids.push(id.clone());
        }
        Ok(Box::new(ChromiumContext {
            browser: self.browser.clone(),
            id,
            opts,
            ffmpeg: self.ffmpeg.clone(),
            recordings: Mutex::new(Vec::new()),
            registry: self.open_contexts.clone(),
        }))
    }
}

struct Recording {
    page: Page,
    stop: Option<oneshot::Sender<()>>,
}

struct ChromiumContext {
    browser: Arc<Browser>,
    id: BrowserContextId,
    opts: ContextOptions,
    ffmpeg: PathBuf,
    recordings: Mutex<Vec<Recording>>,
    registry: Arc<Mutex<Vec<BrowserContextId>>>,
}

impl ChromiumContext {
    async fn emulate(&self, page: &Page) -> ReelResult<()> {
        if let Some(device) = &self.opts.device {
            emulate_device(page, device).await?;
        } else if let Some(Viewport { width, height }) = self.opts.viewport {
            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await
            .map_err(cdp_capture)?;
        }
        Ok(())
    }

    async fn start_recording(&self, page: &Page, rec: &RecordVideo) -> ReelResult<PathBuf> {
        tokio::fs::create_dir_all(&rec.dir).await.map_err(|e| {
            ReelError::capture(format!(
                "failed to create recording dir '{}': {e}",
                rec.dir.display()
            ))
        })?;
        let path = rec.dir.join(format!(
            "rec-{}-{}.webm",
            chrono::Utc::now().timestamp_millis(),
            RECORDING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let mut child = tokio::process::Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "image2pipe", "-use_wallclock_as_timestamps", "1"])
            .args(["-c:v", "mjpeg", "-i", "pipe:0"])
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libvpx", "-b:v", "2M", "-deadline", "realtime"])
            .args(["-cpu-used", "8", "-pix_fmt", "yuv420p"])
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReelError::capture(format!("failed to spawn recording encoder: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::capture("failed to open recorder stdin (unexpected)"))?;

        let frames = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(cdp_capture)?;
        page.execute(
            StartScreencastParams::builder()
                .format(StartScreencastFormat::Jpeg)
                .quality(90)
                .max_width(i64::from(rec.width))
                .max_height(i64::from(rec.height))
                .every_nth_frame(1)
                .build(),
        )
        .await
        .map_err(cdp_capture)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(pump_screencast(page.clone(), frames, stdin, stop_rx));
        let log_path = path.clone();
        // The encoder flushes after stdin closes; nobody waits for it here.
        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(out) if out.status.success() => {
                    tracing::debug!(path = %log_path.display(), "recording flushed")
                }
                Ok(out) => tracing::warn!(
                    path = %log_path.display(),
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "recording encoder failed"
                ),
                Err(e) => tracing::warn!(error = %e, "recording encoder wait failed"),
            }
        });

        if let Ok(mut recs) = self.recordings.lock() {
            recs.push(Recording {
                page: page.clone(),
                stop: Some(stop_tx),
            });
        }
        Ok(path)
    }
}

async fn pump_screencast(
    page: Page,
    mut frames: chromiumoxide::listeners::EventStream<EventScreencastFrame>,
    mut stdin: tokio::process::ChildStdin,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            next = frames.next() => {
                let Some(frame) = next else { break };
                if let Err(e) = page.execute(ScreencastFrameAckParams::new(frame.session_id)).await {
                    tracing::debug!(error = %e, "screencast ack failed");
                }
                let data: &str = frame.data.as_ref();
                match base64::engine::general_purpose::STANDARD.decode(data) {
                    Ok(jpeg) => {
                        if stdin.write_all(&jpeg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "undecodable screencast frame"),
                }
            }
        }
    }
    let _ = stdin.shutdown().await;
}

async fn emulate_device(page: &Page, device: &DeviceProfile) -> ReelResult<()> {
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(device.width),
        i64::from(device.height),
        device.device_scale_factor,
        device.mobile,
    ))
    .await
    .map_err(cdp_capture)?;
    page.execute(SetUserAgentOverrideParams::new(device.user_agent.clone()))
        .await
        .map_err(cdp_capture)?;
    if device.mobile {
        page.execute(SetTouchEmulationEnabledParams::new(true))
            .await
            .map_err(cdp_capture)?;
    }
    Ok(())
}

fn cdp_capture(e: chromiumoxide::error::CdpError) -> ReelError {
    ReelError::capture(e.to_string())
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    async fn new_page(&self) -> ReelResult<Box<dyn PageDriver>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(|e| ReelError::capture(format!("invalid target params: {e}")))?;
        let page = self
            .browser
            .new_page(params)
            .await
            .map_err(|e| ReelError::capture(format!("failed to open page: {e}")))?;
        self.emulate(&page).await?;

        let video = match &self.opts.record_video {
            Some(rec) => Some(self.start_recording(&page, rec).await?),
            None => None,
        };
        Ok(Box::new(ChromiumPage { page, video }))
    }

    async fn close(self: Box<Self>) -> ReelResult<()> {
        let recordings: Vec<Recording> = match self.recordings.lock() {
            Ok(mut recs) => recs.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for mut rec in recordings {
            let _ = rec.page.execute(StopScreencastParams::default()).await;
            if let Some(stop) = rec.stop.take() {
                let _ = stop.send(());
            }
        }
        if let Ok(mut ids) = self.registry.lock() {
            ids.retain(|id| *id != self.id);
        }
        self.browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .map_err(|e| ReelError::capture(format!("failed to dispose context: {e}")))?;
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
    video: Option<PathBuf>,
}

impl ChromiumPage {
    async fn navigate(&self, url: &str, wait: WaitUntil) -> ReelResult<()> {
        let nav_err = |e: chromiumoxide::error::CdpError| ReelError::navigation(format!("{url}: {e}"));
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(nav_err)?;
        let mut loaded = self
            .page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(nav_err)?;
        let mut sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(nav_err)?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(nav_err)?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(nav_err)?;

        let resp = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(nav_err)?;
        if let Some(text) = &resp.result.error_text {
            return Err(ReelError::navigation(format!("{url}: {text}")));
        }

        match wait {
            WaitUntil::DomContentLoaded => {
                dom_ready.next().await;
            }
            WaitUntil::NetworkIdle => {
                loaded.next().await;
                let mut in_flight: i64 = 0;
                loop {
                    tokio::select! {
                        Some(_) = sent.next() => in_flight += 1,
                        Some(_) = finished.next() => in_flight -= 1,
                        Some(_) = failed.next() => in_flight -= 1,
                        _ = tokio::time::sleep(NETWORK_QUIET) => {
                            if in_flight <= 0 {
                                break;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, wait: WaitUntil, timeout: Duration) -> ReelResult<()> {
        match tokio::time::timeout(timeout, self.navigate(url, wait)).await {
            Ok(res) => res,
            Err(_) => Err(ReelError::navigation(format!(
                "{url}: timed out after {}ms waiting for {wait:?}",
                timeout.as_millis()
            ))),
        }
    }

    async fn block_urls(&self, patterns: &[String]) -> ReelResult<()> {
        self.page
            .execute(NetworkEnableParams::default())
            .await
            .map_err(cdp_capture)?;
        self.page
            .execute(SetBlockedUrLsParams::new(patterns.to_vec()))
            .await
            .map_err(cdp_capture)?;
        Ok(())
    }

    async fn screenshot_png(&self, timeout: Duration) -> ReelResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        match tokio::time::timeout(timeout, self.page.screenshot(params)).await {
            Ok(res) => res.map_err(|e| ReelError::capture(format!("screenshot failed: {e}"))),
            Err(_) => Err(ReelError::capture(format!(
                "screenshot timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&self, script: &str) -> ReelResult<serde_json::Value> {
        let mut params = EvaluateParams::new(script);
        params.return_by_value = Some(true);
        params.await_promise = Some(true);
        let res = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| ReelError::capture(format!("script evaluation failed: {e}")))?;
        Ok(res.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn set_virtual_time_policy(
        &self,
        policy: VirtualTimePolicy,
        timeout: Duration,
    ) -> ReelResult<()> {
        let tc_err = |e: chromiumoxide::error::CdpError| ReelError::time_control(e.to_string());
        match policy {
            VirtualTimePolicy::Pause => {
                let params = SetVirtualTimePolicyParams::builder()
                    .policy(CdpVirtualTimePolicy::Pause)
                    .build()
                    .map_err(ReelError::time_control)?;
                self.page.execute(params).await.map_err(tc_err)?;
            }
            VirtualTimePolicy::Advance { budget_ms } => {
                let mut expired = self
                    .page
                    .event_listener::<EventVirtualTimeBudgetExpired>()
                    .await
                    .map_err(tc_err)?;
                let params = SetVirtualTimePolicyParams::builder()
                    .policy(CdpVirtualTimePolicy::Advance)
                    .budget(budget_ms)
                    .build()
                    .map_err(ReelError::time_control)?;
                self.page.execute(params).await.map_err(tc_err)?;
                match tokio::time::timeout(timeout, expired.next()).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        return Err(ReelError::time_control(
                            "page closed while virtual time was advancing",
                        ));
                    }
                    Err(_) => {
                        return Err(ReelError::time_control(format!(
                            "virtual time budget of {budget_ms}ms not consumed within {}ms",
                            timeout.as_millis()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn video_path(&self) -> Option<PathBuf> {
        self.video.clone()
    }

    async fn close(self: Box<Self>) -> ReelResult<()> {
        self.page
            .close()
            .await
            .map_err(|e| ReelError::capture(format!("failed to close page: {e}")))
    }
}
