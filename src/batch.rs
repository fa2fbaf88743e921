//! Bounded-concurrency batch execution with a configurable error policy.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt as _;
use futures_util::stream::FuturesUnordered;

use crate::config::{OnError, ReelConfig};
use crate::foundation::error::{ReelError, ReelResult};
use crate::model::{BatchReport, CaptureRequest, CaptureResult};
use crate::session::{CaptureSession, SessionDeps};

/// Executes one request. The orchestrator's only dependency.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run(&self, req: &CaptureRequest) -> ReelResult<CaptureResult>;
}

/// Runs a real [`CaptureSession`] per request.
#[derive(Clone)]
pub struct PipelineRunner {
    deps: SessionDeps,
}

impl PipelineRunner {
    pub fn new(deps: SessionDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl SessionRunner for PipelineRunner {
    async fn run(&self, req: &CaptureRequest) -> ReelResult<CaptureResult> {
        let started = Instant::now();
        let out = CaptureSession::new(req, &self.deps).run().await?;
        Ok(CaptureResult::succeeded(
            req,
            out.asset_url,
            out.published,
            started.elapsed(),
        ))
    }
}

/// Splits requests into groups of `max_concurrent` and runs each group to completion before
/// starting the next.
///
/// - [`OnError::Abort`]: after a group containing a failure, no further group starts. The group's
///   other in-flight sessions finish, but their results are discarded and the batch fails with
///   [`ReelError::BatchAbort`] wrapping the first failure to complete.
/// - [`OnError::Continue`]: failures become failed results; the batch always completes and keeps
///   request order.
pub struct BatchOrchestrator {
    runner: Arc<dyn SessionRunner>,
    max_concurrent: usize,
    on_error: OnError,
}

impl BatchOrchestrator {
    pub fn new(runner: Arc<dyn SessionRunner>, max_concurrent: usize, on_error: OnError) -> Self {
        Self {
            runner,
            max_concurrent: max_concurrent.max(1),
            on_error,
        }
    }

    pub fn from_config(runner: Arc<dyn SessionRunner>, cfg: &ReelConfig) -> Self {
        Self::new(runner, cfg.max_concurrent, cfg.on_error)
    }

    #[tracing::instrument(
        name = "batch",
        skip_all,
        fields(total = requests.len(), max_concurrent = self.max_concurrent, policy = ?self.on_error)
    )]
    pub async fn run(&self, requests: &[CaptureRequest]) -> ReelResult<BatchReport> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(requests.len());

        for (group_idx, group) in requests.chunks(self.max_concurrent).enumerate() {
            tracing::info!(group = group_idx, size = group.len(), "starting group");
            let mut in_flight: FuturesUnordered<_> = group
                .iter()
                .enumerate()
                .map(|(slot, req)| async move {
                    let t = Instant::now();
                    let res = self.runner.run(req).await;
                    (slot, req, res, t.elapsed())
                })
                .collect();

            let mut slots: Vec<Option<CaptureResult>> = vec![None; group.len()];
            let mut first_failure: Option<(&CaptureRequest, ReelError)> = None;
            while let Some((slot, req, res, elapsed)) = in_flight.next().await {
                match (res, self.on_error) {
                    (Ok(result), _) => slots[slot] = Some(result),
                    (Err(e), OnError::Continue) => {
                        tracing::warn!(output_id = req.output_id(), error = %e, "request failed");
                        slots[slot] = Some(CaptureResult::failed(req, &e, elapsed));
                    }
                    (Err(e), OnError::Abort) => {
                        if first_failure.is_none() {
                            tracing::error!(
                                output_id = req.output_id(),
                                error = %e,
                                "request failed, aborting batch"
                            );
                            first_failure = Some((req, e));
                        } else {
                            tracing::debug!(output_id = req.output_id(), error = %e, "discarding failure");
                        }
                    }
                }
            }

            if let Some((req, e)) = first_failure {
                let not_started = requests.len() - results.len() - group.len();
                tracing::error!(
                    completed = results.len(),
                    discarded = group.len(),
                    not_started,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "batch aborted"
                );
                return Err(ReelError::batch_abort(req.output_id(), e));
            }
            results.extend(slots.into_iter().flatten());
        }

        let report = BatchReport::from_results(results, started.elapsed());
        tracing::info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            elapsed_secs = report.elapsed_secs,
            "batch complete"
        );
        Ok(report)
    }
}
