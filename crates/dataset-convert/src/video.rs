//! Thin adapter over the `ffmpeg`/`ffprobe` binaries.
//!
//! The converter never decodes pixels itself: letterboxing, blank-frame
//! synthesis and stream probes all run as child processes. A missing
//! binary is detected at the point of use and reported as
//! [`ConvertError::ToolMissing`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{ConvertError, Result};

/// Encoder settings shared by every re-encode the converter performs.
/// h264/ultrafast keeps conversion time bounded; downstream training
/// loaders accept it alongside the av1 originals.
const ENCODE_ARGS: [&str; 8] = [
    "-c:v",
    "libx264",
    "-preset",
    "ultrafast",
    "-crf",
    "23",
    "-pix_fmt",
    "yuv420p",
];

#[derive(Debug, Clone)]
pub struct VideoTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for VideoTool {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl VideoTool {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Number of frames in a video stream, counted by decoding.
    ///
    /// Container headers routinely lie about frame counts; downstream
    /// consumers assume frame-for-frame alignment across camera streams,
    /// so we pay for the decode.
    pub async fn frame_count(&self, path: &Path) -> Result<u64> {
        let raw = self
            .run_probe(&[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_frames",
                "-show_entries",
                "stream=nb_read_frames",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ], path)
            .await?;
        raw.trim()
            .parse()
            .map_err(|_| ConvertError::ProbeParse {
                tool: "ffprobe",
                path: path.to_owned(),
                raw,
            })
    }

    /// Stream duration in seconds.
    pub async fn duration_secs(&self, path: &Path) -> Result<f64> {
        let raw = self
            .run_probe(&[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ], path)
            .await?;
        raw.trim()
            .parse()
            .map_err(|_| ConvertError::ProbeParse {
                tool: "ffprobe",
                path: path.to_owned(),
                raw,
            })
    }

    /// Synthesize a black video with an exact frame count.
    ///
    /// `-frames:v` pins the output length; deriving it from a duration
    /// would round at the container level and break the frame-for-frame
    /// alignment contract.
    pub async fn create_blank_video(
        &self,
        output: &Path,
        frames: u64,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<()> {
        ensure_parent(output)?;
        let source = format!("color=c=black:s={width}x{height}:r={fps}");
        let frames_arg = frames.to_string();
        let mut args: Vec<&str> = vec![
            "-y", "-loglevel", "error", "-f", "lavfi", "-i", &source, "-frames:v", &frames_arg,
        ];
        args.extend(ENCODE_ARGS);
        self.run_ffmpeg(&args, output).await
    }

    /// Letterbox a video to a larger target resolution.
    ///
    /// Scales to the target height and pads the width with centered
    /// black bars; the source content is only ever surrounded, never
    /// cropped or stretched.
    pub async fn letterbox(
        &self,
        input: &Path,
        output: &Path,
        target_width: u32,
        target_height: u32,
    ) -> Result<()> {
        ensure_parent(output)?;
        let filter = letterbox_filter(target_width, target_height);
        let input_arg = input.as_os_str().to_string_lossy().into_owned();
        let mut args: Vec<&str> = vec!["-y", "-loglevel", "error", "-i", &input_arg, "-vf", &filter];
        args.extend(ENCODE_ARGS);
        self.run_ffmpeg(&args, output).await
    }

    async fn run_ffmpeg(&self, args: &[&str], output: &Path) -> Result<()> {
        debug!(tool = "ffmpeg", ?args, output = %output.display(), "spawning");
        let result = Command::new(&self.ffmpeg)
            .args(args)
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await;
        let out = match result {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::ToolMissing(
                    self.ffmpeg.display().to_string(),
                ));
            }
            Err(err) => return Err(ConvertError::io(err, output)),
        };
        if !out.status.success() {
            return Err(ConvertError::ToolFailed {
                tool: "ffmpeg",
                path: output.to_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn run_probe(&self, args: &[&str], path: &Path) -> Result<String> {
        let result = Command::new(&self.ffprobe)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await;
        let out = match result {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::ToolMissing(
                    self.ffprobe.display().to_string(),
                ));
            }
            Err(err) => return Err(ConvertError::io(err, path)),
        };
        if !out.status.success() {
            return Err(ConvertError::ToolFailed {
                tool: "ffprobe",
                path: path.to_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

/// The pad filter centers the scaled content horizontally; the vertical
/// offset is zero because scaling already fills the target height.
pub fn letterbox_filter(target_width: u32, target_height: u32) -> String {
    format!("scale=-1:{target_height},pad={target_width}:{target_height}:(ow-iw)/2:0:black")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ConvertError::io(err, parent))?;
    }
    Ok(())
}
