use super::*;

use std::sync::Mutex;

use async_trait::async_trait;

use crate::capture::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;

fn opts(margin: f64) -> TrimOpts {
    TrimOpts {
        safety_margin_secs: margin,
        fallback_start_secs: 3.0,
    }
}

#[test]
fn short_recording_passes_through() {
    assert_eq!(plan_trim(Some(8.0), 10.0, &opts(1.0)), TrimPlan::PassThrough);
    assert_eq!(plan_trim(Some(10.0), 10.0, &opts(1.0)), TrimPlan::PassThrough);
}

#[test]
fn long_recording_is_trimmed_from_the_front() {
    let TrimPlan::Trim(w) = plan_trim(Some(14.5), 10.0, &opts(1.0)) else {
        panic!("expected a trim");
    };
    assert!((w.start_secs - 5.5).abs() < 1e-9);
    assert_eq!(w.duration_secs, 10.0);

    let TrimPlan::Trim(w) = plan_trim(Some(14.5), 10.0, &opts(0.0)) else {
        panic!("expected a trim");
    };
    assert!((w.start_secs + w.duration_secs - 14.5).abs() < 1e-9);
}

#[test]
fn unknown_duration_uses_fixed_offset() {
    assert_eq!(
        plan_trim(None, 10.0, &opts(1.0)),
        TrimPlan::Trim(TrimWindow {
            start_secs: 3.0,
            duration_secs: 10.0
        })
    );
}

#[derive(Default)]
struct ScriptedEncoder {
    probe: Option<f64>,
    fail: Vec<Container>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn encode_frames(
        &self,
        frames: &FrameSet,
        _frame_rate: FrameRate,
        container: Container,
        out: &Path,
    ) -> ReelResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("encode:{}", container.extension()));
        if self.fail.contains(&container) {
            std::fs::write(out, b"partial").unwrap();
            return Err(ReelError::assembly("codec unavailable"));
        }
        std::fs::write(out, frames.frames().concat()).unwrap();
        Ok(())
    }

    async fn probe_duration(&self, _input: &Path) -> ReelResult<f64> {
        self.probe
            .ok_or_else(|| ReelError::assembly("unparseable metadata"))
    }

    async fn trim(
        &self,
        _input: &Path,
        window: TrimWindow,
        container: Container,
        out: &Path,
    ) -> ReelResult<()> {
        self.calls.lock().unwrap().push(format!(
            "trim:{}@{}",
            container.extension(),
            window.start_secs
        ));
        if self.fail.contains(&container) {
            return Err(ReelError::assembly("trim failed"));
        }
        std::fs::write(out, b"trimmed").unwrap();
        Ok(())
    }
}

fn frames(n: u64) -> FrameSet {
    let mut set = FrameSet::new();
    set.begin(SinkConfig {
        frame_count: n,
        frame_rate: FrameRate::new(30).unwrap(),
    })
    .unwrap();
    for i in 0..n {
        set.push_frame(FrameIndex(i), vec![i as u8 + 1]).unwrap();
    }
    set.end().unwrap();
    set
}

#[tokio::test]
async fn frames_fall_back_to_webm_and_clean_up_partial_mp4() {
    let dir = tempfile::tempdir().unwrap();
    let enc = Arc::new(ScriptedEncoder {
        fail: vec![Container::Mp4],
        ..Default::default()
    });
    let asm = VideoAssembler::new(enc.clone(), dir.path(), opts(1.0));

    let got = asm
        .assemble_frames(&frames(3), FrameRate::new(30).unwrap(), "clip")
        .await
        .unwrap();
    assert_eq!(got.outcome, AssemblyOutcome::Encoded(Container::Webm));
    assert_eq!(got.path, dir.path().join("clip.webm"));
    assert!(!dir.path().join("clip.mp4").exists());
    assert_eq!(
        *enc.calls.lock().unwrap(),
        vec!["encode:mp4".to_owned(), "encode:webm".to_owned()]
    );
}

#[tokio::test]
async fn frames_fail_when_both_encodes_fail() {
    let dir = tempfile::tempdir().unwrap();
    let enc = Arc::new(ScriptedEncoder {
        fail: vec![Container::Mp4, Container::Webm],
        ..Default::default()
    });
    let asm = VideoAssembler::new(enc, dir.path(), opts(1.0));
    let err = asm
        .assemble_frames(&frames(2), FrameRate::new(30).unwrap(), "clip")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::foundation::error::ErrorKind::Assembly);
}

#[tokio::test]
async fn passthrough_is_a_byte_identical_copy() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.webm");
    let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    std::fs::write(&raw, &bytes).unwrap();
    let enc = Arc::new(ScriptedEncoder {
        probe: Some(4.0),
        ..Default::default()
    });
    let asm = VideoAssembler::new(enc.clone(), dir.path().join("out"), opts(1.0));

    let first = asm.assemble_recording(&raw, 10.0, "clip").await.unwrap();
    assert_eq!(first.outcome, AssemblyOutcome::PassThrough);
    assert_eq!(std::fs::read(&first.path).unwrap(), bytes);

    let again = asm.assemble_recording(&first.path, 10.0, "clip-2").await.unwrap();
    assert_eq!(std::fs::read(&again.path).unwrap(), bytes);
    assert!(enc.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn probe_failure_trims_at_fixed_offset() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.webm");
    std::fs::write(&raw, b"raw").unwrap();
    let enc = Arc::new(ScriptedEncoder::default());
    let asm = VideoAssembler::new(enc.clone(), dir.path(), opts(1.0));

    let got = asm.assemble_recording(&raw, 10.0, "clip").await.unwrap();
    assert_eq!(
        got.outcome,
        AssemblyOutcome::Trimmed {
            window: TrimWindow {
                start_secs: 3.0,
                duration_secs: 10.0
            },
            container: Container::Mp4
        }
    );
    assert_eq!(got.path, dir.path().join("clip.mp4"));
}

#[tokio::test]
async fn failed_trims_keep_the_untrimmed_original() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.webm");
    std::fs::write(&raw, b"original").unwrap();
    let enc = Arc::new(ScriptedEncoder {
        probe: Some(15.0),
        fail: vec![Container::Mp4, Container::Webm],
        ..Default::default()
    });
    let asm = VideoAssembler::new(enc.clone(), dir.path().join("out"), opts(1.0));

    let got = asm.assemble_recording(&raw, 10.0, "clip").await.unwrap();
    assert_eq!(got.outcome, AssemblyOutcome::Untrimmed);
    assert_eq!(std::fs::read(&got.path).unwrap(), b"original");
    assert_eq!(
        *enc.calls.lock().unwrap(),
        vec!["trim:mp4@6".to_owned(), "trim:webm@6".to_owned()]
    );
}
