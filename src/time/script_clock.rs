use async_trait::async_trait;

use crate::browser::PageDriver;
use crate::foundation::error::{ReelError, ReelResult};
use crate::time::{ClockStrategy, TimeController};

const PATCH_SCRIPT: &str = include_str!("script_clock.js");

/// Script-patched clock. Installs the patch lazily on the first `advance`.
pub struct ScriptClock<'p> {
    page: &'p dyn PageDriver,
    installed: bool,
}

impl<'p> ScriptClock<'p> {
    pub fn new(page: &'p dyn PageDriver) -> Self {
        Self {
            page,
            installed: false,
        }
    }

    async fn install(&mut self) -> ReelResult<()> {
        let ok = self
            .page
            .evaluate(PATCH_SCRIPT)
            .await
            .map_err(|e| ReelError::time_control(format!("failed to inject clock patch: {e}")))?;
        if ok != serde_json::Value::Bool(true) {
            return Err(ReelError::time_control(format!(
                "clock patch did not initialize (returned {ok})"
            )));
        }
        self.installed = true;
        Ok(())
    }
}

pub(crate) fn tick_expression(delta_ms: f64) -> String {
    format!("window.__reelTick({delta_ms})")
}

#[async_trait]
impl TimeController for ScriptClock<'_> {
    async fn advance(&mut self, delta_ms: f64) -> ReelResult<f64> {
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            return Err(ReelError::time_control(format!(
                "advance delta must be a non-negative number, got {delta_ms}"
            )));
        }
        if !self.installed {
            self.install().await?;
        }
        let now = self
            .page
            .evaluate(&tick_expression(delta_ms))
            .await
            .map_err(|e| ReelError::time_control(format!("clock tick failed: {e}")))?;
        now.as_f64().ok_or_else(|| {
            ReelError::time_control(format!("clock tick returned a non-number: {now}"))
        })
    }

    fn strategy(&self) -> ClockStrategy {
        ClockStrategy::ScriptPatched
    }
}
