use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::Command;

use crate::capture::sink::FrameSet;
use crate::config::ReelConfig;
use crate::encode::probe::{parse_format_duration, parse_last_progress_time};
use crate::encode::{Container, Encoder, TrimWindow};
use crate::foundation::core::{FrameRate, format_timestamp};
use crate::foundation::error::{ReelError, ReelResult};

/// Encoder backed by the system `ffmpeg` and `ffprobe` binaries.
///
/// The binaries are invoked as subprocesses so no native FFmpeg development files are needed.
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(cfg: &ReelConfig) -> Self {
        Self::new(cfg.ffmpeg.clone(), cfg.ffprobe.clone())
    }

    fn ffmpeg_cmd(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-y").args(["-hide_banner", "-nostdin"]);
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run a non-interactive ffmpeg invocation, returning its stderr on success.
    async fn run(&self, mut cmd: Command, what: &str) -> ReelResult<String> {
        let out = cmd.output().await.map_err(|e| {
            ReelError::assembly(format!(
                "failed to spawn {what} (is '{}' installed and on PATH?): {e}",
                self.ffmpeg.display()
            ))
        })?;
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            return Err(ReelError::assembly(format!(
                "{what} exited with status {}: {}",
                out.status,
                last_lines(&stderr, 6)
            )));
        }
        Ok(stderr)
    }

    async fn probe_container(&self, input: &Path) -> ReelResult<Option<f64>> {
        let out = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ReelError::assembly(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(ReelError::assembly(format!(
                "ffprobe failed for '{}': {}",
                input.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(parse_format_duration(&out.stdout))
    }

    async fn probe_by_decoding(&self, input: &Path) -> ReelResult<Option<f64>> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-i"])
            .arg(input)
            .args(["-f", "null", "-"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let stderr = self.run(cmd, "ffmpeg null decode").await?;
        Ok(parse_last_progress_time(&stderr))
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode_frames(
        &self,
        frames: &FrameSet,
        frame_rate: FrameRate,
        container: Container,
        out: &Path,
    ) -> ReelResult<()> {
        if frames.is_empty() {
            return Err(ReelError::validation("cannot encode an empty frame set"));
        }
        let (width, height) = frame_dimensions(frames)?;
        ensure_parent_dir(out)?;

        let mut cmd = self.ffmpeg_cmd();
        cmd.stdin(Stdio::piped());
        cmd.args(["-loglevel", "error", "-f", "image2pipe", "-c:v", "png"])
            .args(["-framerate", &frame_rate.to_string()])
            .args(["-i", "pipe:0", "-an"]);
        // yuv420p needs even dimensions.
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            cmd.args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"]);
        }
        match container {
            Container::Mp4 => cmd.args([
                "-c:v",
                "libx264",
                "-crf",
                "18",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]),
            Container::Webm => cmd.args([
                "-c:v", "libvpx", "-crf", "10", "-b:v", "4M", "-pix_fmt", "yuv420p",
            ]),
        };
        cmd.args(["-r", &frame_rate.to_string()]).arg(out);

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::assembly(format!(
                "failed to spawn ffmpeg (is '{}' installed and on PATH?): {e}",
                self.ffmpeg.display()
            ))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::assembly("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::assembly("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = tokio::spawn(async move {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes).await.map(|_| bytes)
        });

        let mut write_err = None;
        for (i, png) in frames.frames().iter().enumerate() {
            if let Err(e) = stdin.write_all(png).await {
                write_err = Some(format!("failed to write frame {i} to ffmpeg stdin: {e}"));
                break;
            }
        }
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| ReelError::assembly(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match stderr_drain.await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(ReelError::assembly(format!("ffmpeg stderr read failed: {e}"))),
            Err(_) => return Err(ReelError::assembly("ffmpeg stderr drain task panicked")),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::assembly(format!(
                "ffmpeg exited with status {status}: {}",
                last_lines(&stderr, 6)
            )));
        }
        if let Some(msg) = write_err {
            return Err(ReelError::assembly(msg));
        }
        tracing::debug!(
            out = %out.display(),
            frames = frames.len(),
            width,
            height,
            ?container,
            "frames encoded"
        );
        Ok(())
    }

    async fn probe_duration(&self, input: &Path) -> ReelResult<f64> {
        match self.probe_container(input).await {
            Ok(Some(secs)) => return Ok(secs),
            Ok(None) => {
                tracing::debug!(input = %input.display(), "container has no duration, decoding")
            }
            Err(e) => tracing::debug!(error = %e, "ffprobe failed, decoding"),
        }
        self.probe_by_decoding(input).await?.ok_or_else(|| {
            ReelError::assembly(format!(
                "could not determine duration of '{}'",
                input.display()
            ))
        })
    }

    async fn trim(
        &self,
        input: &Path,
        window: TrimWindow,
        container: Container,
        out: &Path,
    ) -> ReelResult<()> {
        ensure_parent_dir(out)?;
        let mut cmd = self.ffmpeg_cmd();
        cmd.args(["-loglevel", "error"])
            .args(["-ss", &format_timestamp(window.start_secs)])
            .arg("-i")
            .arg(input)
            .args(["-t", &format!("{:.3}", window.duration_secs)]);
        match container {
            Container::Mp4 => cmd.args([
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                "18",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-c:a",
                "aac",
                "-b:a",
                "192k",
            ]),
            Container::Webm => cmd.args(["-c", "copy"]),
        };
        cmd.args(["-avoid_negative_ts", "make_zero"]).arg(out);
        self.run(cmd, "ffmpeg trim").await?;
        Ok(())
    }
}

/// Width and height shared by every frame, read from the image headers.
fn frame_dimensions(frames: &FrameSet) -> ReelResult<(u32, u32)> {
    let mut dims = None;
    for (i, png) in frames.frames().iter().enumerate() {
        let d = image::ImageReader::new(Cursor::new(png.as_slice()))
            .with_guessed_format()
            .map_err(|e| ReelError::frame(i as u64, format!("unreadable image: {e}")))?
            .into_dimensions()
            .map_err(|e| ReelError::frame(i as u64, format!("unreadable image header: {e}")))?;
        match dims {
            None => dims = Some(d),
            Some(first) if first != d => {
                return Err(ReelError::frame(
                    i as u64,
                    format!(
                        "frame size mismatch: got {}x{}, expected {}x{}",
                        d.0, d.1, first.0, first.1
                    ),
                ));
            }
            Some(_) => {}
        }
    }
    dims.ok_or_else(|| ReelError::validation("cannot encode an empty frame set"))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join(" | ")
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when both `ffmpeg` and `ffprobe` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|bin| {
        std::process::Command::new(bin)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}
