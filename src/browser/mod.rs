//! Browser seam.
//!
//! Capture code only talks to these traits. [`chromium`] implements them over the Chrome DevTools
//! Protocol; tests provide in-process fakes.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DeviceProfile;
use crate::foundation::core::Viewport;
use crate::foundation::error::ReelResult;

#[cfg(feature = "chromium")]
pub mod chromium;

/// Navigation completion condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    /// `load` followed by a quiet period without network activity.
    NetworkIdle,
}

/// Continuous recording requested for every page of a context.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordVideo {
    pub dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Options for a new isolated browsing context.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextOptions {
    pub viewport: Option<Viewport>,
    pub device: Option<DeviceProfile>,
    pub record_video: Option<RecordVideo>,
}

/// Process-wide browser, shared by all sessions. Each call yields a fresh isolated context.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_context(&self, opts: ContextOptions) -> ReelResult<Box<dyn BrowsingContext>>;
}

/// Isolated browsing context (separate cookies, storage and cache).
///
/// Closing a recording context is what finalizes its recordings; the files may still be flushed
/// after `close` returns.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> ReelResult<Box<dyn PageDriver>>;
    async fn close(self: Box<Self>) -> ReelResult<()>;
}

/// Virtual time policy, mirroring the DevTools `Emulation.setVirtualTimePolicy` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VirtualTimePolicy {
    Pause,
    /// Let exactly `budget_ms` of virtual time elapse, then pause again.
    Advance { budget_ms: f64 },
}

/// Single page (tab) capabilities used by the capture pipeline.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, wait: WaitUntil, timeout: Duration) -> ReelResult<()>;

    /// Block requests whose URL matches any of the wildcard patterns.
    async fn block_urls(&self, patterns: &[String]) -> ReelResult<()>;

    /// PNG of the current viewport.
    async fn screenshot_png(&self, timeout: Duration) -> ReelResult<Vec<u8>>;

    /// Evaluate a script and return its JSON-serializable result (`null` for `undefined`).
    async fn evaluate(&self, script: &str) -> ReelResult<serde_json::Value>;

    /// Apply a virtual time policy. For `Advance`, resolves once the budget has been consumed.
    async fn set_virtual_time_policy(
        &self,
        policy: VirtualTimePolicy,
        timeout: Duration,
    ) -> ReelResult<()>;

    /// Path of this page's recording when its context records video. The file may not exist yet.
    fn video_path(&self) -> Option<PathBuf>;

    async fn close(self: Box<Self>) -> ReelResult<()>;
}
