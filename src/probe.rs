//! Clip geometry and duration via `ffprobe`.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

/// What the compositor needs to know about one input clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    /// Seconds, `None` when neither the stream nor the container reports one.
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

pub fn probe_clip(ffprobe: &Path, clip: &Path) -> Result<ClipInfo> {
    if !clip.is_file() {
        bail!("input clip not found: {}", clip.display());
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(clip)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {}", ffprobe.display()))?;

    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe failed on {} with status {}: {}",
            clip.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    parse_probe_output(&output.stdout)
        .with_context(|| format!("unexpected ffprobe output for {}", clip.display()))
}

fn parse_probe_output(json: &[u8]) -> Result<ClipInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;
    let stream = probe
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| anyhow!("no video stream found"))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        bail!("video stream has no dimensions");
    };
    if width == 0 || height == 0 {
        bail!("video stream has empty dimensions {width}x{height}");
    }

    let duration = parse_seconds(stream.duration.as_deref()).or_else(|| {
        parse_seconds(
            probe
                .format
                .as_ref()
                .and_then(|format| format.duration.as_deref()),
        )
    });

    Ok(ClipInfo {
        width,
        height,
        duration,
    })
}

fn parse_seconds(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_video_stream() {
        let json = br#"{
            "streams": [
                { "codec_type": "audio", "duration": "12.0" },
                { "codec_type": "video", "width": 640, "height": 480, "duration": "10.5" }
            ],
            "format": { "duration": "12.0" }
        }"#;
        let info = parse_probe_output(json).expect("probe output should parse");
        assert_eq!(
            info,
            ClipInfo {
                width: 640,
                height: 480,
                duration: Some(10.5)
            }
        );
    }

    #[test]
    fn falls_back_to_container_duration() {
        let json = br#"{
            "streams": [{ "codec_type": "video", "width": 320, "height": 240, "duration": "N/A" }],
            "format": { "duration": "4.0" }
        }"#;
        let info = parse_probe_output(json).expect("probe output should parse");
        assert_eq!(info.duration, Some(4.0));
    }

    #[test]
    fn rejects_output_without_video() {
        let json = br#"{ "streams": [{ "codec_type": "audio" }], "format": {} }"#;
        assert!(parse_probe_output(json).is_err());
    }
}
