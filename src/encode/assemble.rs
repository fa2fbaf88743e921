use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capture::sink::FrameSet;
use crate::config::TrimOpts;
use crate::encode::{Container, Encoder, TrimWindow};
use crate::foundation::core::FrameRate;
use crate::foundation::error::{ReelError, ReelResult};

/// What to do with a raw recording of a given real duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrimPlan {
    /// Recording is not longer than the target; copy it unchanged.
    PassThrough,
    Trim(TrimWindow),
}

/// Decide how to cut a recording down to `target_secs`.
///
/// Trimming always removes the front: the tail is assumed to show the animation in steady state.
/// `real_secs == None` means probing failed and the conservative fixed offset is used.
pub fn plan_trim(real_secs: Option<f64>, target_secs: f64, opts: &TrimOpts) -> TrimPlan {
    match real_secs {
        Some(real) if real <= target_secs => TrimPlan::PassThrough,
        Some(real) => TrimPlan::Trim(TrimWindow {
            start_secs: real - target_secs + opts.safety_margin_secs,
            duration_secs: target_secs,
        }),
        None => TrimPlan::Trim(TrimWindow {
            start_secs: opts.fallback_start_secs,
            duration_secs: target_secs,
        }),
    }
}

/// How the final file was produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AssemblyOutcome {
    Encoded(Container),
    PassThrough,
    Trimmed {
        window: TrimWindow,
        container: Container,
    },
    /// Both trim attempts failed; the original recording was kept at full length.
    Untrimmed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub outcome: AssemblyOutcome,
}

/// Produces one final video per capture in `out_dir`, named after the capture's identifier.
#[derive(Clone)]
pub struct VideoAssembler {
    encoder: Arc<dyn Encoder>,
    out_dir: PathBuf,
    trim: TrimOpts,
}

impl VideoAssembler {
    pub fn new(encoder: Arc<dyn Encoder>, out_dir: impl Into<PathBuf>, trim: TrimOpts) -> Self {
        Self {
            encoder,
            out_dir: out_dir.into(),
            trim,
        }
    }

    fn output_path(&self, stem: &str, ext: &str) -> PathBuf {
        self.out_dir.join(format!("{stem}.{ext}"))
    }

    /// Encode an exact frame set. Duration is exact by construction; no trimming.
    ///
    /// Tries MP4 first, then WebM. Fails only if both encodes fail.
    pub async fn assemble_frames(
        &self,
        frames: &FrameSet,
        frame_rate: FrameRate,
        stem: &str,
    ) -> ReelResult<AssembledVideo> {
        let mut failures = Vec::new();
        for container in [Container::Mp4, Container::Webm] {
            let out = self.output_path(stem, container.extension());
            match self
                .encoder
                .encode_frames(frames, frame_rate, container, &out)
                .await
            {
                Ok(()) => {
                    return Ok(AssembledVideo {
                        path: out,
                        outcome: AssemblyOutcome::Encoded(container),
                    });
                }
                Err(e) => {
                    tracing::warn!(stem, ?container, error = %e, "frame encode failed");
                    remove_partial(&out).await;
                    failures.push(format!("{}: {e}", container.extension()));
                }
            }
        }
        Err(ReelError::assembly(format!(
            "all encodes failed for '{stem}': {}",
            failures.join("; ")
        )))
    }

    /// Cut a raw recording down to `target_secs`.
    ///
    /// Duration correctness is given up before availability: when both trims fail the untrimmed
    /// original is returned.
    pub async fn assemble_recording(
        &self,
        raw: &Path,
        target_secs: f64,
        stem: &str,
    ) -> ReelResult<AssembledVideo> {
        let real = match self.encoder.probe_duration(raw).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                tracing::warn!(
                    raw = %raw.display(),
                    error = %e,
                    fallback_start_secs = self.trim.fallback_start_secs,
                    "duration probe failed"
                );
                None
            }
        };
        let raw_ext = raw
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(Container::Webm.extension());

        let window = match plan_trim(real, target_secs, &self.trim) {
            TrimPlan::PassThrough => {
                let out = self.output_path(stem, raw_ext);
                self.encoder.copy(raw, &out).await?;
                tracing::info!(stem, real_secs = real, target_secs, "recording passed through");
                return Ok(AssembledVideo {
                    path: out,
                    outcome: AssemblyOutcome::PassThrough,
                });
            }
            TrimPlan::Trim(window) => window,
        };

        tracing::info!(
            stem,
            real_secs = real,
            start_secs = window.start_secs,
            duration_secs = window.duration_secs,
            "trimming recording"
        );
        let mut failures = Vec::new();
        for container in [Container::Mp4, Container::Webm] {
            let out = self.output_path(stem, container.extension());
            match self.encoder.trim(raw, window, container, &out).await {
                Ok(()) => {
                    return Ok(AssembledVideo {
                        path: out,
                        outcome: AssemblyOutcome::Trimmed { window, container },
                    });
                }
                Err(e) => {
                    tracing::warn!(stem, ?container, error = %e, "trim failed");
                    remove_partial(&out).await;
                    failures.push(format!("{}: {e}", container.extension()));
                }
            }
        }

        let out = self.output_path(stem, raw_ext);
        match self.encoder.copy(raw, &out).await {
            Ok(()) => {
                tracing::warn!(stem, "using untrimmed recording");
                Ok(AssembledVideo {
                    path: out,
                    outcome: AssemblyOutcome::Untrimmed,
                })
            }
            Err(e) => Err(ReelError::assembly(format!(
                "all trims failed for '{stem}' ({}) and the original could not be kept: {e}",
                failures.join("; ")
            ))),
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), error = %e, "failed to remove partial output");
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/assemble.rs"]
mod tests;
