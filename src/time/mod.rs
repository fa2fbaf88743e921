//! Deterministic control over a page's animation clock.
//!
//! Two interchangeable strategies sit behind [`TimeController`]:
//! - [`VirtualClock`]: DevTools virtual time, paused and advanced by exact budgets.
//! - [`ScriptClock`]: patched `requestAnimationFrame` / `setTimeout` / `performance.now`
//!   driven by an injected synchronous tick. Less accurate; used when the first strategy fails.

use async_trait::async_trait;

use crate::browser::PageDriver;
use crate::foundation::error::ReelResult;

mod script_clock;
mod virtual_clock;

pub use script_clock::ScriptClock;
pub use virtual_clock::VirtualClock;

/// Which clock drives a capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStrategy {
    VirtualTime,
    ScriptPatched,
}

impl ClockStrategy {
    /// Strategy to retry with after this one failed, if any.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::VirtualTime => Some(Self::ScriptPatched),
            Self::ScriptPatched => None,
        }
    }
}

/// Drives the passage of time on one page.
///
/// `advance` must resolve before the next frame is captured; callers never pipeline calls. Any
/// error leaves the page's time state undefined.
#[async_trait]
pub trait TimeController: Send {
    /// Advance the page clock by `delta_ms`, returning the clock's new value in ms.
    async fn advance(&mut self, delta_ms: f64) -> ReelResult<f64>;

    fn strategy(&self) -> ClockStrategy;
}

/// Build the controller for `strategy` on `page`.
pub fn clock_for<'p>(
    strategy: ClockStrategy,
    page: &'p dyn PageDriver,
    advance_timeout: std::time::Duration,
) -> Box<dyn TimeController + 'p> {
    match strategy {
        ClockStrategy::VirtualTime => Box::new(VirtualClock::new(page, advance_timeout)),
        ClockStrategy::ScriptPatched => Box::new(ScriptClock::new(page)),
    }
}
