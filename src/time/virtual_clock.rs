use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{PageDriver, VirtualTimePolicy};
use crate::foundation::error::{ReelError, ReelResult};
use crate::time::{ClockStrategy, TimeController};

/// DevTools virtual time.
///
/// The first `advance` pauses the page clock (the capability probe); each call then grants an
/// exact budget and waits until the browser reports it consumed.
pub struct VirtualClock<'p> {
    page: &'p dyn PageDriver,
    timeout: Duration,
    paused: bool,
    now_ms: f64,
}

impl<'p> VirtualClock<'p> {
    pub fn new(page: &'p dyn PageDriver, timeout: Duration) -> Self {
        Self {
            page,
            timeout,
            paused: false,
            now_ms: 0.0,
        }
    }

    async fn pause(&mut self) -> ReelResult<()> {
        self.page
            .set_virtual_time_policy(VirtualTimePolicy::Pause, self.timeout)
            .await
            .map_err(|e| ReelError::time_control(format!("failed to pause virtual time: {e}")))?;
        self.paused = true;
        Ok(())
    }
}

#[async_trait]
impl TimeController for VirtualClock<'_> {
    async fn advance(&mut self, delta_ms: f64) -> ReelResult<f64> {
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            return Err(ReelError::time_control(format!(
                "advance delta must be a non-negative number, got {delta_ms}"
            )));
        }
        if !self.paused {
            self.pause().await?;
        }
        if delta_ms > 0.0 {
            self.page
                .set_virtual_time_policy(
                    VirtualTimePolicy::Advance {
                        budget_ms: delta_ms,
                    },
                    self.timeout,
                )
                .await
                .map_err(|e| {
                    ReelError::time_control(format!(
                        "virtual time advance by {delta_ms}ms at t={}ms failed: {e}",
                        self.now_ms
                    ))
                })?;
        }
        self.now_ms += delta_ms;
        Ok(self.now_ms)
    }

    fn strategy(&self) -> ClockStrategy {
        ClockStrategy::VirtualTime
    }
}
