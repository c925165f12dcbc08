//! Video and webcam plumbing over ffmpeg subprocesses.
//!
//! Decoding, encoding, and the live preview all speak raw RGB24 over pipes,
//! so the only runtime requirement is an ffmpeg installation on `PATH`.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;
use tracing::debug;

use crate::config::WebcamConfig;
use crate::errors::{Result, SalientError};

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Total frame count when the container reports one.
    pub nb_frames: Option<u64>,
}

/// `FFprobe` JSON output structure
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

fn binary(name: &str) -> String {
    which::which(name).map_or_else(
        |_| name.to_string(),
        |p| p.to_string_lossy().to_string(),
    )
}

/// Parse frame rates like "30/1", "30000/1001", or "25".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => raw.parse().ok(),
    }
}

/// Read the first video stream's geometry and frame rate.
pub fn probe(path: &Path) -> Result<VideoMeta> {
    let output = Command::new(binary("ffprobe"))
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| SalientError::Ffmpeg(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SalientError::Ffmpeg(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| SalientError::Ffmpeg(format!("unreadable ffprobe output: {e}")))?;
    let stream = probe.streams.first().ok_or_else(|| {
        SalientError::Ffmpeg(format!("no video stream in {}", path.display()))
    })?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(SalientError::Ffmpeg(format!(
                "stream in {} reports no geometry",
                path.display()
            )))
        }
    };
    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);
    let nb_frames = stream.nb_frames.as_deref().and_then(|n| n.parse().ok());

    Ok(VideoMeta {
        width,
        height,
        fps,
        nb_frames,
    })
}

/// Pull one `width x height` rgb24 frame off the stream. A clean end of
/// stream, or a truncated final chunk shorter than a frame, yields `None`.
fn read_rgb_frame(
    stream: &mut impl Read,
    width: u32,
    height: u32,
) -> std::io::Result<Option<RgbImage>> {
    let mut buf = vec![0_u8; width as usize * height as usize * 3];
    match stream.read_exact(&mut buf) {
        Ok(()) => Ok(RgbImage::from_raw(width, height, buf)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Geometry check for fixed-size frame sinks.
fn ensure_frame_size(expected_width: u32, expected_height: u32, frame: &RgbImage) -> Result<()> {
    let (width, height) = frame.dimensions();
    if (width, height) != (expected_width, expected_height) {
        return Err(SalientError::FrameSizeMismatch {
            expected_width,
            expected_height,
            width,
            height,
        });
    }
    Ok(())
}

fn drain_stderr(stderr: &mut Option<ChildStderr>) -> String {
    let mut message = String::new();
    if let Some(mut pipe) = stderr.take() {
        let _ = pipe.read_to_string(&mut message);
    }
    message.trim().to_string()
}

/// Sequential RGB frame decoder for a video file.
pub struct VideoReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    meta: VideoMeta,
    finished: bool,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        let meta = probe(path)?;
        let mut child = Command::new(binary("ffmpeg"))
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SalientError::Ffmpeg(format!("failed to start ffmpeg decoder: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SalientError::Ffmpeg("decoder stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();
        debug!(video = %path.display(), width = meta.width, height = meta.height, fps = meta.fps, "decoder started");
        Ok(Self {
            child,
            stdout,
            stderr,
            meta,
            finished: false,
        })
    }

    pub fn meta(&self) -> &VideoMeta {
        &self.meta
    }

    fn finish_decoder(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| SalientError::Ffmpeg(format!("failed to reap decoder: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(SalientError::Ffmpeg(format!(
                "decoder exited with {status}: {}",
                drain_stderr(&mut self.stderr)
            )))
        }
    }
}

impl Iterator for VideoReader {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match read_rgb_frame(&mut self.stdout, self.meta.width, self.meta.height) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                match self.finish_decoder() {
                    Ok(()) => None,
                    Err(e) => Some(Err(e)),
                }
            }
            Err(e) => {
                self.finished = true;
                Some(Err(SalientError::Ffmpeg(format!(
                    "decoder read failed: {e}"
                ))))
            }
        }
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Live RGB frame capture from a local camera device.
///
/// Frames are scaled by ffmpeg to the configured geometry, so every frame the
/// iterator yields has the same dimensions regardless of what the device
/// negotiated.
pub struct WebcamReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    width: u32,
    height: u32,
}

#[cfg(target_os = "macos")]
fn capture_args(device: u32, config: &WebcamConfig) -> Vec<String> {
    vec![
        "-f".to_string(),
        "avfoundation".to_string(),
        "-framerate".to_string(),
        format!("{}", config.fps),
        "-video_size".to_string(),
        format!("{}x{}", config.width, config.height),
        "-i".to_string(),
        format!("{device}"),
    ]
}

#[cfg(not(target_os = "macos"))]
fn capture_args(device: u32, config: &WebcamConfig) -> Vec<String> {
    vec![
        "-f".to_string(),
        "v4l2".to_string(),
        "-framerate".to_string(),
        format!("{}", config.fps),
        "-video_size".to_string(),
        format!("{}x{}", config.width, config.height),
        "-i".to_string(),
        format!("/dev/video{device}"),
    ]
}

impl WebcamReader {
    pub fn open(device: u32, config: &WebcamConfig) -> Result<Self> {
        let mut child = Command::new(binary("ffmpeg"))
            .args(["-loglevel", "error"])
            .args(capture_args(device, config))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-vf", &format!("scale={}:{}", config.width, config.height)])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SalientError::Ffmpeg(format!("failed to start ffmpeg capture: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SalientError::Ffmpeg("capture stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();
        debug!(device, width = config.width, height = config.height, "capture started");
        Ok(Self {
            child,
            stdout,
            stderr,
            width: config.width,
            height: config.height,
        })
    }
}

impl Iterator for WebcamReader {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_rgb_frame(&mut self.stdout, self.width, self.height) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                let detail = drain_stderr(&mut self.stderr);
                Some(Err(SalientError::Ffmpeg(format!(
                    "camera stream ended unexpectedly: {detail}"
                ))))
            }
            Err(e) => Some(Err(SalientError::Ffmpeg(format!(
                "capture read failed: {e}"
            )))),
        }
    }
}

impl Drop for WebcamReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Lazily-created MPEG-4 encoder fed raw RGB frames over stdin.
pub struct VideoWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<ChildStderr>,
    width: u32,
    height: u32,
}

impl VideoWriter {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        let mut child = Command::new(binary("ffmpeg"))
            .args(["-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-video_size", &format!("{width}x{height}")])
            .args(["-framerate", &format!("{fps}")])
            .args(["-i", "pipe:0"])
            .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SalientError::Ffmpeg(format!("failed to start ffmpeg encoder: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SalientError::Ffmpeg("encoder stdin unavailable".to_string()))?;
        let stderr = child.stderr.take();
        debug!(output = %path.display(), width, height, fps, "encoder started");
        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            width,
            height,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        ensure_frame_size(self.width, self.height, frame)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SalientError::Ffmpeg("encoder already finished".to_string()))?;
        stdin.write_all(frame.as_raw()).map_err(|e| {
            SalientError::Ffmpeg(format!(
                "encoder write failed: {e}: {}",
                drain_stderr(&mut self.stderr)
            ))
        })
    }

    /// Close stdin and wait for the encoder to flush the container.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| SalientError::Ffmpeg(format!("failed to reap encoder: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(SalientError::Ffmpeg(format!(
                "encoder exited with {status}: {}",
                drain_stderr(&mut self.stderr)
            )))
        }
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}

/// On-screen preview window backed by ffplay.
pub struct Preview {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl Preview {
    pub fn open(title: &str, width: u32, height: u32, fps: f64) -> Result<Self> {
        let mut child = Command::new(binary("ffplay"))
            .args(["-loglevel", "error"])
            .args(["-f", "rawvideo", "-pixel_format", "rgb24"])
            .args(["-video_size", &format!("{width}x{height}")])
            .args(["-framerate", &format!("{fps}")])
            .args(["-window_title", title])
            .arg("pipe:0")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SalientError::Ffmpeg(format!("failed to start ffplay preview: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SalientError::Ffmpeg("preview stdin unavailable".to_string()))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            width,
            height,
        })
    }

    /// Push one frame. Returns `false` once the user has closed the window.
    pub fn show(&mut self, frame: &RgbImage) -> Result<bool> {
        ensure_frame_size(self.width, self.height, frame)?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(false);
        };
        match stdin.write_all(frame.as_raw()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                self.stdin = None;
                Ok(false)
            }
            Err(e) => Err(SalientError::Ffmpeg(format!("preview write failed: {e}"))),
        }
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
