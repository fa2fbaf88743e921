/// Container duration from `ffprobe -print_format json -show_format` output.
///
/// Returns `None` when the container carries no usable duration, which is common for WebM written
/// from a live stream.
pub fn parse_format_duration(json: &[u8]) -> Option<f64> {
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        format: Option<ProbeFormat>,
    }

    let parsed: ProbeOut = serde_json::from_slice(json).ok()?;
    let secs = parsed.format?.duration?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Last `time=HH:MM:SS.xx` progress stamp in ffmpeg's stderr.
///
/// Decoding a file to the null muxer reports the full decoded duration in its final stamp.
pub fn parse_last_progress_time(stderr: &str) -> Option<f64> {
    stderr
        .rsplit("time=")
        .filter_map(|tail| {
            let stamp: String = tail
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
                .collect();
            parse_clock(&stamp)
        })
        .next()
}

fn parse_clock(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let h = parts.next()?.parse::<f64>().ok()?;
    let m = parts.next()?.parse::<f64>().ok()?;
    let s = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let secs = h * 3600.0 + m * 60.0 + s;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/probe.rs"]
mod tests;
