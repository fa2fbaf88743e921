use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ReadinessOpts;
use crate::foundation::error::{ReelError, ReelResult};

/// Polls a recording until its size stops changing.
///
/// A poll whose non-zero size equals the previous poll's size bumps a counter; any change resets
/// it. The file is ready once the counter reaches `stable_polls`. While the file does not exist
/// yet, the faster pending interval is used.
#[derive(Clone, Debug)]
pub struct FileReadinessWaiter {
    opts: ReadinessOpts,
}

impl FileReadinessWaiter {
    pub fn new(opts: ReadinessOpts) -> Self {
        Self { opts }
    }

    pub async fn wait(&self, path: Option<&Path>, max_wait: Duration) -> ReelResult<PathBuf> {
        let started = Instant::now();
        let mut last_size: Option<u64> = None;
        let mut stable = 0u32;

        loop {
            let size = match path {
                Some(p) => tokio::fs::metadata(p).await.ok().map(|m| m.len()),
                None => None,
            };

            match size {
                Some(s) if s > 0 => {
                    if last_size == Some(s) {
                        stable += 1;
                    } else {
                        stable = 0;
                    }
                    if stable >= self.opts.stable_polls {
                        if let Some(p) = path {
                            tracing::debug!(
                                path = %p.display(),
                                size = s,
                                waited_ms = started.elapsed().as_millis() as u64,
                                "recording stable"
                            );
                            return Ok(p.to_path_buf());
                        }
                    }
                }
                _ => stable = 0,
            }
            if size.is_some() {
                last_size = size;
            }

            let waited = started.elapsed();
            if waited >= max_wait {
                return Err(ReelError::ReadinessTimeout {
                    path: path.map(Path::to_path_buf),
                    last_size: last_size.unwrap_or(0),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            let interval = if size.is_some() {
                self.opts.poll_interval_ms
            } else {
                self.opts.pending_interval_ms
            };
            let remaining = max_wait - waited;
            tokio::time::sleep(Duration::from_millis(interval).min(remaining)).await;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/capture/readiness.rs"]
mod tests;
