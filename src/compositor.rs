use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::config::{Margins, MergeConfig};
use crate::probe::{probe_clip, ClipInfo};

/// One top/bottom merge.
#[derive(Debug, Clone, Copy)]
pub struct ComposeJob<'a> {
    pub top: &'a Path,
    pub bottom: &'a Path,
    pub output: &'a Path,
}

/// Stacks two clips into a single output file.
pub trait Compositor: Send + Sync {
    fn compose(&self, job: &ComposeJob<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
}

/// Canvas size and clip offsets for a vertical stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    pub width: u32,
    pub height: u32,
    pub top: Placement,
    pub bottom: Placement,
}

impl StackLayout {
    /// Lays out `top` above `bottom`, each `(width, height)`, centered on a
    /// canvas rounded up to even dimensions. The rounding pixel lands in the
    /// right and bottom margins.
    pub fn compute(top: (u32, u32), bottom: (u32, u32), margins: &Margins) -> Result<Self> {
        let (top_width, top_height) = top;
        let (bottom_width, bottom_height) = bottom;
        let content_width = sum(&[top_width.max(bottom_width), margins.left, margins.right])?;
        let content_height = sum(&[
            top_height,
            bottom_height,
            margins.top,
            margins.middle,
            margins.bottom,
        ])?;
        let bottom_y = sum(&[top_height, margins.top, margins.middle])?;

        Ok(Self {
            width: round_up_even(content_width)?,
            height: round_up_even(content_height)?,
            top: Placement {
                x: (content_width - top_width) / 2,
                y: margins.top,
            },
            bottom: Placement {
                x: (content_width - bottom_width) / 2,
                y: bottom_y,
            },
        })
    }
}

fn sum(parts: &[u32]) -> Result<u32> {
    parts
        .iter()
        .try_fold(0u32, |total, &part| total.checked_add(part))
        .ok_or_else(|| anyhow!("stacked canvas is too large: {parts:?} overflows u32"))
}

fn round_up_even(value: u32) -> Result<u32> {
    value
        .checked_add(value % 2)
        .ok_or_else(|| anyhow!("stacked canvas is too large: {value} cannot be rounded to even"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegMode {
    System,
    Sidecar,
}

/// Resolved `ffmpeg`/`ffprobe` executables.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    mode: FfmpegMode,
}

impl MediaTools {
    pub fn resolve(mode: FfmpegMode) -> Result<Self> {
        match mode {
            FfmpegMode::System => {
                let ffmpeg = which::which("ffmpeg").map_err(|_| {
                    anyhow!("ffmpeg executable not found on PATH (mode=system). Install ffmpeg or build with `--features sidecar_ffmpeg`.")
                })?;
                let ffprobe = which::which("ffprobe").map_err(|_| {
                    anyhow!("ffprobe executable not found on PATH (mode=system). Install ffmpeg or build with `--features sidecar_ffmpeg`.")
                })?;
                Ok(Self {
                    ffmpeg,
                    ffprobe,
                    mode,
                })
            }
            FfmpegMode::Sidecar => resolve_sidecar(),
        }
    }

    fn mode_label(&self) -> &'static str {
        match self.mode {
            FfmpegMode::System => "system",
            FfmpegMode::Sidecar => "sidecar",
        }
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
fn resolve_sidecar() -> Result<MediaTools> {
    let ffmpeg = ffmpeg_sidecar::paths::ffmpeg_path();
    let ffprobe = ffmpeg_sidecar::ffprobe::ffprobe_path();
    if !ffmpeg.exists() || !ffprobe.exists() {
        ffmpeg_sidecar::download::auto_download()
            .context("failed to auto-download ffmpeg sidecar binary")?;
    }
    Ok(MediaTools {
        ffmpeg,
        ffprobe,
        mode: FfmpegMode::Sidecar,
    })
}

#[cfg(not(feature = "sidecar_ffmpeg"))]
fn resolve_sidecar() -> Result<MediaTools> {
    Err(anyhow!(
        "ffmpeg sidecar mode requested but vstack was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
    ))
}

/// Composites with an `ffmpeg` filter graph.
///
/// Executables are resolved on the first compose, so a batch where every
/// output already exists never needs ffmpeg installed.
#[derive(Debug)]
pub struct FfmpegCompositor {
    mode: FfmpegMode,
    tools: OnceLock<Result<MediaTools, String>>,
    fps: u32,
    speed_factor: f64,
    margins: Margins,
    codec: String,
}

impl FfmpegCompositor {
    pub fn new(mode: FfmpegMode, config: &MergeConfig) -> Self {
        Self {
            mode,
            tools: OnceLock::new(),
            fps: config.fps,
            speed_factor: config.speed_factor,
            margins: config.margins,
            codec: config.codec.clone(),
        }
    }

    pub fn with_tools(tools: MediaTools, config: &MergeConfig) -> Self {
        let mut compositor = Self::new(tools.mode, config);
        compositor.tools = OnceLock::from(Ok(tools));
        compositor
    }

    fn tools(&self) -> Result<&MediaTools> {
        self.tools
            .get_or_init(|| MediaTools::resolve(self.mode).map_err(|error| format!("{error:#}")))
            .as_ref()
            .map_err(|message| anyhow!("{message}"))
    }

    fn args(&self, job: &ComposeJob<'_>, top: &ClipInfo, bottom: &ClipInfo) -> Result<Vec<String>> {
        let source_duration = match (top.duration, bottom.duration) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => bail!(
                "could not determine duration of {} or {}",
                job.top.display(),
                job.bottom.display()
            ),
        };
        let layout = StackLayout::compute(
            (top.width, top.height),
            (bottom.width, bottom.height),
            &self.margins,
        )?;
        let graph = stack_filter(
            &layout,
            self.fps,
            self.speed_factor,
            source_duration / self.speed_factor,
        );

        let mut args = vec![
            "-hide_banner".to_owned(),
            "-loglevel".to_owned(),
            "error".to_owned(),
            "-y".to_owned(),
            "-i".to_owned(),
            job.top.to_string_lossy().into_owned(),
            "-i".to_owned(),
            job.bottom.to_string_lossy().into_owned(),
            "-filter_complex".to_owned(),
            graph,
            "-map".to_owned(),
            "[out]".to_owned(),
            "-an".to_owned(),
            "-c:v".to_owned(),
            self.codec.clone(),
            "-pix_fmt".to_owned(),
            "yuv420p".to_owned(),
            "-r".to_owned(),
            self.fps.to_string(),
        ];
        args.extend(container_output_args(job.output));
        args.push(job.output.to_string_lossy().into_owned());
        Ok(args)
    }
}

impl Compositor for FfmpegCompositor {
    fn compose(&self, job: &ComposeJob<'_>) -> Result<()> {
        let path_str = job.output.to_string_lossy();
        if path_str.chars().any(|c| c.is_control()) {
            bail!("Output path contains invalid control characters");
        }

        let tools = self.tools()?;
        let top = probe_clip(&tools.ffprobe, job.top)?;
        let bottom = probe_clip(&tools.ffprobe, job.bottom)?;
        let partial = partial_path(job.output);
        let staged = ComposeJob {
            output: &partial,
            ..*job
        };
        let args = self.args(&staged, &top, &bottom)?;
        let mode_label = tools.mode_label();
        debug!(output = %job.output.display(), args = %args.join(" "), "running ffmpeg");

        let output = Command::new(&tools.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow!(
                        "ffmpeg executable not found (mode={mode_label}, resolved_path={})",
                        tools.ffmpeg.display()
                    )
                } else {
                    anyhow!(
                        "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}): {error}",
                        tools.ffmpeg.display()
                    )
                }
            })?;

        if !output.status.success() {
            let _ = fs::remove_file(&partial);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "ffmpeg failed with status {} (mode={mode_label}, args='{}', stderr_tail='{}')",
                output.status,
                args.join(" "),
                last_n_chars(&stderr, 500)
            ));
        }

        fs::rename(&partial, job.output).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                partial.display(),
                job.output.display()
            )
        })
    }
}

/// `out/Mouse1_Run1.mp4` becomes `out/Mouse1_Run1.partial.mp4`, keeping the
/// extension so ffmpeg still picks the container from it.
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    output.with_file_name(name)
}

/// Black canvas for `duration` seconds with both clips slowed by
/// `speed_factor` and overlaid at their placements, resampled to `fps`.
pub fn stack_filter(layout: &StackLayout, fps: u32, speed_factor: f64, duration: f64) -> String {
    format!(
        "color=c=black:s={w}x{h}:r={fps}:d={duration:.3}[bg];\
         [0:v]setpts=(PTS-STARTPTS)/{speed_factor}[top];\
         [1:v]setpts=(PTS-STARTPTS)/{speed_factor}[bottom];\
         [bg][top]overlay=x={tx}:y={ty}:eof_action=pass[upper];\
         [upper][bottom]overlay=x={bx}:y={by}:eof_action=pass,fps={fps}[out]",
        w = layout.width,
        h = layout.height,
        tx = layout.top.x,
        ty = layout.top.y,
        bx = layout.bottom.x,
        by = layout.bottom.y,
    )
}

fn container_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mov" | "mp4" | "m4v") {
        vec!["-movflags".to_owned(), "+faststart".to_owned()]
    } else {
        Vec::new()
    }
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_centers_clips_and_adds_margins() {
        let layout = StackLayout::compute((640, 480), (600, 200), &Margins::default())
            .expect("layout should fit");

        assert_eq!(layout.width, 640 + 30 + 30);
        assert_eq!(layout.height, 480 + 200 + 50 + 50 + 50);
        assert_eq!(layout.top, Placement { x: 30, y: 50 });
        assert_eq!(layout.bottom, Placement { x: 50, y: 480 + 50 + 50 });
    }

    #[test]
    fn layout_uses_the_wider_clip_for_canvas_width() {
        let margins = Margins {
            top: 0,
            middle: 0,
            bottom: 0,
            left: 0,
            right: 0,
        };
        let layout =
            StackLayout::compute((320, 240), (640, 480), &margins).expect("layout should fit");
        assert_eq!((layout.width, layout.height), (640, 720));
        assert_eq!(layout.top, Placement { x: 160, y: 0 });
        assert_eq!(layout.bottom, Placement { x: 0, y: 240 });
    }

    #[test]
    fn odd_canvas_is_padded_to_even_on_the_right_and_bottom() {
        let layout = StackLayout::compute((320, 240), (321, 241), &Margins::default())
            .expect("layout should fit");

        assert_eq!((layout.width, layout.height), (382, 632));
        assert_eq!(layout.top, Placement { x: 30, y: 50 });
        assert_eq!(layout.bottom, Placement { x: 30, y: 340 });
        assert_eq!(layout.width % 2, 0);
        assert_eq!(layout.height % 2, 0);
    }

    #[test]
    fn oversized_margins_are_a_geometry_error() {
        let margins = Margins {
            top: u32::MAX,
            ..Margins::default()
        };
        let error = StackLayout::compute((320, 240), (320, 240), &margins)
            .expect_err("height cannot fit in u32");
        assert!(error.to_string().contains("too large"), "{error}");

        let error = StackLayout::compute((u32::MAX, 10), (10, 10), &Margins::default())
            .expect_err("width cannot fit in u32");
        assert!(error.to_string().contains("too large"), "{error}");
    }

    #[test]
    fn partial_output_keeps_the_container_extension() {
        assert_eq!(
            partial_path(Path::new("/out/Mouse1_Run1.mp4")),
            PathBuf::from("/out/Mouse1_Run1.partial.mp4")
        );
        assert_eq!(
            partial_path(Path::new("out/Mouse1_Run1_left")),
            PathBuf::from("out/Mouse1_Run1_left.partial")
        );
    }

    #[test]
    fn filter_graph_retimes_and_places_both_inputs() {
        let layout = StackLayout::compute((100, 80), (100, 60), &Margins::default())
            .expect("layout should fit");
        let graph = stack_filter(&layout, 30, 0.1, 20.0);

        assert!(graph.starts_with("color=c=black:s=160x290:r=30:d=20.000[bg];"));
        assert!(graph.contains("[0:v]setpts=(PTS-STARTPTS)/0.1[top]"));
        assert!(graph.contains("[1:v]setpts=(PTS-STARTPTS)/0.1[bottom]"));
        assert!(graph.contains("overlay=x=30:y=50:eof_action=pass[upper]"));
        assert!(graph.contains("overlay=x=30:y=180:eof_action=pass,fps=30[out]"));
    }

    #[test]
    fn args_use_longest_clip_and_configured_codec() {
        let tools = MediaTools {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            mode: FfmpegMode::System,
        };
        let config = MergeConfig {
            codec: "libx265".to_owned(),
            speed_factor: 0.5,
            ..MergeConfig::default()
        };
        let compositor = FfmpegCompositor::with_tools(tools, &config);
        let job = ComposeJob {
            top: Path::new("/in/top.avi"),
            bottom: Path::new("/in/bottom.avi"),
            output: Path::new("/out/Mouse1_Run1.mp4"),
        };
        let top = ClipInfo {
            width: 64,
            height: 48,
            duration: Some(2.0),
        };
        let bottom = ClipInfo {
            width: 64,
            height: 48,
            duration: Some(3.0),
        };

        let args = compositor
            .args(&job, &top, &bottom)
            .expect("args should build");
        let graph_index = args
            .iter()
            .position(|arg| arg == "-filter_complex")
            .expect("filter graph present")
            + 1;
        assert!(args[graph_index].contains(":d=6.000[bg]"));
        assert!(args.windows(2).any(|pair| pair == ["-c:v", "libx265"]));
        assert!(args.windows(2).any(|pair| pair == ["-movflags", "+faststart"]));
        assert_eq!(args.last().map(String::as_str), Some("/out/Mouse1_Run1.mp4"));
    }

    #[test]
    fn args_fail_without_any_duration() {
        let tools = MediaTools {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            mode: FfmpegMode::System,
        };
        let compositor = FfmpegCompositor::with_tools(tools, &MergeConfig::default());
        let job = ComposeJob {
            top: Path::new("a.avi"),
            bottom: Path::new("b.avi"),
            output: Path::new("out.mp4"),
        };
        let clip = ClipInfo {
            width: 10,
            height: 10,
            duration: None,
        };
        assert!(compositor.args(&job, &clip, &clip).is_err());
    }

    #[cfg(not(feature = "sidecar_ffmpeg"))]
    #[test]
    fn sidecar_mode_requires_feature() {
        let error = MediaTools::resolve(FfmpegMode::Sidecar).expect_err("sidecar needs feature");
        assert!(error.to_string().contains("sidecar_ffmpeg"));
    }
}
