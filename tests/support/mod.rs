#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use webreel::batch::SessionRunner;
use webreel::browser::{
    BrowserEngine, BrowsingContext, ContextOptions, PageDriver, VirtualTimePolicy, WaitUntil,
};
use webreel::capture::sink::FrameSet;
use webreel::encode::{Container, Encoder, TrimWindow};
use webreel::model::{CaptureRequest, CaptureResult};
use webreel::store::Store;
use webreel::{FrameRate, ReelError, ReelResult};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn count(log: &Log, prefix: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| e.starts_with(prefix)).count()
}

pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Scripted page behaviour, shared by every page a [`FakeBrowser`] opens.
#[derive(Clone, Debug, Default)]
pub struct PageScript {
    /// Virtual time cannot be paused (capability probe fails).
    pub virtual_time_unsupported: bool,
    /// The script clock patch does not initialize.
    pub script_clock_unsupported: bool,
    /// Screenshot of this frame index fails, on every page.
    pub screenshot_fails_at: Option<u64>,
    /// Navigations to these URLs fail.
    pub unreachable: Vec<String>,
    /// Navigations waiting for `DOMContentLoaded` fail; warm-up still succeeds.
    pub fail_dom_content_loaded: bool,
    /// Bytes written to a recording when its context closes.
    pub recording_bytes: usize,
    /// Delay before a recording appears after its context closes.
    pub flush_delay: Duration,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub script: PageScript,
    pub log: Log,
    pub open_contexts: Arc<AtomicUsize>,
    /// Virtual time budgets granted, across all pages.
    pub budgets: Arc<Mutex<Vec<f64>>>,
}

impl FakeBrowser {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl BrowserEngine for FakeBrowser {
    async fn new_context(&self, opts: ContextOptions) -> ReelResult<Box<dyn BrowsingContext>> {
        self.open_contexts.fetch_add(1, Ordering::SeqCst);
        let kind = if opts.record_video.is_some() {
            "recording"
        } else {
            "plain"
        };
        self.push(format!("context:new:{kind}"));
        Ok(Box::new(FakeContext {
            browser: self.clone(),
            opts,
            pages: AtomicUsize::new(0),
            recordings: Mutex::new(Vec::new()),
        }))
    }
}

pub struct FakeContext {
    browser: FakeBrowser,
    opts: ContextOptions,
    pages: AtomicUsize,
    recordings: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn new_page(&self) -> ReelResult<Box<dyn PageDriver>> {
        let n = self.pages.fetch_add(1, Ordering::SeqCst);
        self.browser.push("page:new".to_owned());
        let video = self.opts.record_video.as_ref().map(|rec| {
            let path = rec.dir.join(format!("rec-{n}.webm"));
            self.recordings.lock().unwrap().push(path.clone());
            path
        });
        Ok(Box::new(FakePage {
            browser: self.browser.clone(),
            video,
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(self: Box<Self>) -> ReelResult<()> {
        self.browser.open_contexts.fetch_sub(1, Ordering::SeqCst);
        self.browser.push("context:close".to_owned());
        let paths: Vec<PathBuf> = self.recordings.lock().unwrap().drain(..).collect();
        let bytes = self.browser.script.recording_bytes;
        let delay = self.browser.script.flush_delay;
        for path in paths {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(dir) = path.parent() {
                    let _ = tokio::fs::create_dir_all(dir).await;
                }
                let _ = tokio::fs::write(&path, vec![0x1a; bytes]).await;
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    paused: bool,
    patched: bool,
    clock_ms: f64,
    shots: u64,
}

pub struct FakePage {
    browser: FakeBrowser,
    video: Option<PathBuf>,
    state: Mutex<PageState>,
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, wait: WaitUntil, _timeout: Duration) -> ReelResult<()> {
        self.browser.push(format!("goto:{wait:?}:{url}"));
        if self.browser.script.unreachable.iter().any(|u| u == url) {
            return Err(ReelError::navigation(format!("{url}: net::ERR_NAME_NOT_RESOLVED")));
        }
        if self.browser.script.fail_dom_content_loaded && wait == WaitUntil::DomContentLoaded {
            return Err(ReelError::navigation(format!("{url}: timed out after 30000ms")));
        }
        Ok(())
    }

    async fn block_urls(&self, patterns: &[String]) -> ReelResult<()> {
        self.browser.push(format!("block:{}", patterns.len()));
        Ok(())
    }

    async fn screenshot_png(&self, _timeout: Duration) -> ReelResult<Vec<u8>> {
        let idx = {
            let mut st = self.state.lock().unwrap();
            let idx = st.shots;
            st.shots += 1;
            idx
        };
        if self.browser.script.screenshot_fails_at == Some(idx) {
            return Err(ReelError::capture("Target closed"));
        }
        Ok(tiny_png())
    }

    async fn evaluate(&self, script: &str) -> ReelResult<serde_json::Value> {
        if let Some(arg) = script
            .strip_prefix("window.__reelTick(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let mut st = self.state.lock().unwrap();
            if !st.patched {
                return Err(ReelError::capture("window.__reelTick is not a function"));
            }
            let delta: f64 = arg.parse().unwrap();
            st.clock_ms += delta;
            return Ok(serde_json::json!(st.clock_ms));
        }
        if script.contains("__reelClock") {
            self.browser.push("eval:patch".to_owned());
            if self.browser.script.script_clock_unsupported {
                return Ok(serde_json::Value::Null);
            }
            self.state.lock().unwrap().patched = true;
            return Ok(serde_json::Value::Bool(true));
        }
        Ok(serde_json::Value::Null)
    }

    async fn set_virtual_time_policy(
        &self,
        policy: VirtualTimePolicy,
        _timeout: Duration,
    ) -> ReelResult<()> {
        if self.browser.script.virtual_time_unsupported {
            return Err(ReelError::capture(
                "Emulation.setVirtualTimePolicy wasn't found",
            ));
        }
        let mut st = self.state.lock().unwrap();
        match policy {
            VirtualTimePolicy::Pause => {
                self.browser.push("vt:pause".to_owned());
                st.paused = true;
            }
            VirtualTimePolicy::Advance { budget_ms } => {
                if !st.paused {
                    return Err(ReelError::capture("virtual time not paused"));
                }
                st.clock_ms += budget_ms;
                self.browser.budgets.lock().unwrap().push(budget_ms);
            }
        }
        Ok(())
    }

    fn video_path(&self) -> Option<PathBuf> {
        self.video.clone()
    }

    async fn close(self: Box<Self>) -> ReelResult<()> {
        self.browser.push("page:close".to_owned());
        Ok(())
    }
}

/// Encoder that writes placeholder files and records what it was asked to do.
#[derive(Default)]
pub struct FakeEncoder {
    pub probe_secs: Option<f64>,
    pub failing: Vec<Container>,
    pub calls: Mutex<Vec<String>>,
    pub frames_seen: Mutex<Vec<usize>>,
}

impl FakeEncoder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode_frames(
        &self,
        frames: &FrameSet,
        frame_rate: FrameRate,
        container: Container,
        out: &Path,
    ) -> ReelResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("encode:{}@{frame_rate}", container.extension()));
        self.frames_seen.lock().unwrap().push(frames.len());
        if self.failing.contains(&container) {
            return Err(ReelError::assembly("encoder not available"));
        }
        if let Some(dir) = out.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(out, format!("{} frames", frames.len())).unwrap();
        Ok(())
    }

    async fn probe_duration(&self, _input: &Path) -> ReelResult<f64> {
        self.probe_secs
            .ok_or_else(|| ReelError::assembly("no duration in container"))
    }

    async fn trim(
        &self,
        _input: &Path,
        window: TrimWindow,
        container: Container,
        out: &Path,
    ) -> ReelResult<()> {
        self.calls.lock().unwrap().push(format!(
            "trim:{}:{}+{}",
            container.extension(),
            window.start_secs,
            window.duration_secs
        ));
        if self.failing.contains(&container) {
            return Err(ReelError::assembly("trim failed"));
        }
        if let Some(dir) = out.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(out, b"trimmed").unwrap();
        Ok(())
    }
}

/// Store that keeps published keys in memory.
#[derive(Default)]
pub struct FakeStore {
    pub fail: bool,
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl Store for FakeStore {
    async fn put(&self, local: &Path, key: &str) -> ReelResult<String> {
        if self.fail {
            return Err(ReelError::publish("AccessDenied"));
        }
        assert!(local.exists(), "published file must exist");
        self.keys.lock().unwrap().push(key.to_owned());
        Ok(format!("https://store.test/{key}"))
    }
}

/// Runner with scripted per-request outcomes and a start counter.
#[derive(Default)]
pub struct ScriptedRunner {
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    pub fail: Vec<String>,
    pub delays_ms: HashMap<String, u64>,
}

impl ScriptedRunner {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail: ids.iter().map(|s| (*s).to_owned()).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, id: &str, ms: u64) -> Self {
        self.delays_ms.insert(id.to_owned(), ms);
        self
    }
}

#[async_trait]
impl SessionRunner for ScriptedRunner {
    async fn run(&self, req: &CaptureRequest) -> ReelResult<CaptureResult> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(ms) = self.delays_ms.get(req.output_id()) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail.iter().any(|id| id == req.output_id()) {
            return Err(ReelError::navigation(format!(
                "{}: timed out after 30000ms",
                req.source_url()
            )));
        }
        Ok(CaptureResult::succeeded(
            req,
            format!("https://store.test/converted-videos/{}.mp4", req.output_id()),
            true,
            Duration::from_millis(5),
        ))
    }
}

pub fn request(url: &str, id: &str) -> CaptureRequest {
    CaptureRequest::new(url, 1.0, FrameRate::new(30).unwrap(), id).unwrap()
}

/// Config rooted in `dir` with the waits shrunk for tests.
pub fn test_config(dir: &Path) -> webreel::ReelConfig {
    let mut cfg = webreel::ReelConfig {
        output_dir: dir.join("out"),
        work_dir: dir.join("work"),
        ..webreel::ReelConfig::default()
    };
    cfg.timeouts.warmup_settle_ms = 0;
    cfg.timeouts.readiness_max_wait_ms = 2_000;
    cfg.readiness.poll_interval_ms = 10;
    cfg.readiness.pending_interval_ms = 10;
    cfg
}

pub struct Harness {
    pub browser: FakeBrowser,
    pub encoder: Arc<FakeEncoder>,
    pub store: Arc<FakeStore>,
    pub deps: webreel::SessionDeps,
}

pub fn harness(
    cfg: webreel::ReelConfig,
    script: PageScript,
    encoder: FakeEncoder,
    store: FakeStore,
) -> Harness {
    let browser = FakeBrowser::new(script);
    let encoder = Arc::new(encoder);
    let store = Arc::new(store);
    let deps = webreel::SessionDeps {
        engine: Arc::new(browser.clone()),
        encoder: encoder.clone(),
        store: store.clone(),
        config: Arc::new(cfg),
    };
    Harness {
        browser,
        encoder,
        store,
        deps,
    }
}
