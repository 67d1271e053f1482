//! Video capture: frame encoders and capture finalization.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::str::FromStr;
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use talkpic_common::{ExportDefaults, TalkpicError, TalkpicResult};
use talkpic_face_model::Size;

/// Output container and codec pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// MP4 with H.264 video and AAC audio.
    #[serde(rename = "mp4")]
    Mp4H264,
    /// WebM with VP9 video and Opus audio.
    Webm,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4H264 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// ffmpeg encoder name used for the video stream.
    pub fn video_codec(self) -> &'static str {
        match self {
            Self::Mp4H264 => "libx264",
            Self::Webm => "libvpx-vp9",
        }
    }

    /// The other format, tried when this one cannot be encoded.
    pub fn fallback(self) -> Self {
        match self {
            Self::Mp4H264 => Self::Webm,
            Self::Webm => Self::Mp4H264,
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Mp4H264
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = TalkpicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" | "h264" => Ok(Self::Mp4H264),
            "webm" | "vp9" => Ok(Self::Webm),
            other => Err(TalkpicError::config(format!(
                "Unknown export format '{other}' (expected mp4 or webm)"
            ))),
        }
    }
}

/// Everything an encoder needs to start a capture.
#[derive(Debug, Clone)]
pub struct CaptureJob {
    pub output_path: PathBuf,

    /// Audio track muxed alongside the frames.
    pub audio_path: PathBuf,

    /// Frame dimensions; every pushed frame must match.
    pub surface: Size,

    pub fps: u32,

    pub format: ExportFormat,

    pub video_bitrate_kbps: u32,

    pub audio_bitrate_kbps: u32,
}

impl CaptureJob {
    pub fn new(
        output_path: impl Into<PathBuf>,
        audio_path: impl Into<PathBuf>,
        surface: Size,
        fps: u32,
        format: ExportFormat,
    ) -> Self {
        let defaults = ExportDefaults::default();
        Self {
            output_path: output_path.into(),
            audio_path: audio_path.into(),
            surface,
            fps,
            format,
            video_bitrate_kbps: defaults.video_bitrate_kbps,
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
        }
    }

    pub fn with_bitrates(mut self, video_kbps: u32, audio_kbps: u32) -> Self {
        self.video_bitrate_kbps = video_kbps;
        self.audio_bitrate_kbps = audio_kbps;
        self
    }
}

/// A finished capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMedia {
    pub path: PathBuf,
    pub bytes: u64,
    pub format: ExportFormat,
}

/// Trait for capture backends.
///
/// Lifecycle: `begin` once, `push_frame` per rendered frame, then either
/// `finish` (flush and close) or `abort` (discard).
pub trait FrameEncoder: Send {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend is usable on the system.
    fn is_available(&self) -> bool;

    /// Whether this backend can produce the given format.
    fn supports(&self, format: ExportFormat) -> bool;

    fn begin(&mut self, job: &CaptureJob) -> TalkpicResult<()>;

    fn push_frame(&mut self, frame: &RgbaImage) -> TalkpicResult<()>;

    /// Stop accepting frames and flush the output.
    fn finish(&mut self) -> TalkpicResult<()>;

    /// Stop immediately and discard partial output.
    fn abort(&mut self);

    /// Current output path, once a capture has begun.
    fn output_path(&self) -> Option<&Path>;

    /// Current size of the output file, if it exists.
    fn output_size(&self) -> Option<u64> {
        let path = self.output_path()?;
        std::fs::metadata(path).ok().map(|meta| meta.len())
    }

    /// Whether a capture is in progress.
    fn is_active(&self) -> bool;
}

/// Pick the preferred format, or its fallback, that the encoder supports.
pub fn negotiate_format(
    encoder: &dyn FrameEncoder,
    preferred: ExportFormat,
) -> TalkpicResult<ExportFormat> {
    if encoder.supports(preferred) {
        return Ok(preferred);
    }
    let fallback = preferred.fallback();
    if encoder.supports(fallback) {
        tracing::warn!(
            preferred = %preferred,
            fallback = %fallback,
            encoder = encoder.name(),
            "Preferred export format unsupported, falling back"
        );
        return Ok(fallback);
    }
    Err(TalkpicError::unsupported(format!(
        "{} can encode neither {preferred} nor {fallback}",
        encoder.name()
    )))
}

/// `lip-sync-animation-<unix-ms>.<ext>`
pub fn default_output_name(format: ExportFormat, unix_ms: i64) -> String {
    format!("lip-sync-animation-{unix_ms}.{}", format.extension())
}

pub fn default_output_path(dir: &Path, format: ExportFormat) -> PathBuf {
    dir.join(default_output_name(
        format,
        chrono::Utc::now().timestamp_millis(),
    ))
}

/// How finished output is probed before it is accepted.
#[derive(Debug, Clone)]
pub struct FinalizePolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
    /// Output at or below this size counts as not yet written.
    pub min_readable_bytes: u64,
    /// Accepted output below this size is reported as truncated.
    pub min_plausible_bytes: u64,
}

impl FinalizePolicy {
    pub fn from_defaults(defaults: &ExportDefaults) -> Self {
        Self {
            attempts: defaults.finalize_attempts.max(1),
            retry_delay: Duration::from_millis(defaults.retry_delay_ms),
            min_readable_bytes: defaults.min_readable_bytes,
            min_plausible_bytes: defaults.min_plausible_bytes,
        }
    }
}

impl Default for FinalizePolicy {
    fn default() -> Self {
        Self::from_defaults(&ExportDefaults::default())
    }
}

/// Finish the capture and wait for plausible output.
///
/// The output is probed up to `policy.attempts` times. Missing or
/// undersized output is a retryable [`TalkpicError::CaptureFailure`]
/// carrying the last observed size and the number of probes.
pub async fn finalize_capture(
    encoder: &mut dyn FrameEncoder,
    format: ExportFormat,
    policy: &FinalizePolicy,
) -> TalkpicResult<EncodedMedia> {
    let path = encoder
        .output_path()
        .map(Path::to_path_buf)
        .ok_or_else(|| TalkpicError::illegal_state("Finalize requested before capture began"))?;

    if let Err(err) = encoder.finish() {
        return Err(TalkpicError::capture(
            format!("Encoder failed to finalize: {err}"),
            encoder.output_size(),
            1,
        ));
    }

    let allowed = policy.attempts.max(1);
    let mut attempts = 0;
    let mut bytes = None;
    while attempts < allowed {
        attempts += 1;
        bytes = encoder.output_size();
        tracing::debug!(attempt = attempts, bytes = ?bytes, "Probing capture output");
        if bytes.is_some_and(|b| b > policy.min_readable_bytes) {
            break;
        }
        if attempts < allowed {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    match bytes {
        Some(b) if b > policy.min_readable_bytes => {
            if b < policy.min_plausible_bytes {
                return Err(TalkpicError::capture(
                    "File too small, the output looks truncated. Try splitting the audio or using a shorter track",
                    Some(b),
                    attempts,
                ));
            }
            tracing::info!(
                path = %path.display(),
                bytes = b,
                attempts,
                "Capture finalized"
            );
            Ok(EncodedMedia {
                path,
                bytes: b,
                format,
            })
        }
        _ => Err(TalkpicError::capture(
            "Encoder produced no readable output. Try a shorter audio track",
            bytes,
            attempts,
        )),
    }
}

/// Encoder backed by an `ffmpeg` child process.
///
/// Frames are streamed as raw RGBA on stdin; the audio track is read by
/// ffmpeg directly from disk.
pub struct FfmpegEncoder {
    binary: String,
    running: Option<RunningEncode>,
    output: Option<PathBuf>,
}

struct RunningEncode {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    surface: Size,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            running: None,
            output: None,
        }
    }

    fn list_encoders(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn supports(&self, format: ExportFormat) -> bool {
        self.list_encoders()
            .map(|list| {
                list.lines()
                    .any(|line| line.split_whitespace().nth(1) == Some(format.video_codec()))
            })
            .unwrap_or(false)
    }

    fn begin(&mut self, job: &CaptureJob) -> TalkpicResult<()> {
        if self.running.is_some() {
            return Err(TalkpicError::illegal_state("ffmpeg capture already running"));
        }
        if job.surface.is_empty() {
            return Err(TalkpicError::render("Cannot capture an empty surface"));
        }
        if let Some(parent) = job.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = build_ffmpeg_args(job);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TalkpicError::render(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child.stdin.take();
        let stderr_task = child.stderr.take().map(|mut stderr| {
            // Drained on its own thread so ffmpeg never blocks on a full pipe.
            std::thread::spawn(move || -> String {
                let mut output = String::new();
                match stderr.read_to_string(&mut output) {
                    Ok(_) => output,
                    Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
                }
            })
        });

        tracing::info!(
            pid = child.id(),
            output = %job.output_path.display(),
            format = %job.format,
            width = job.surface.width,
            height = job.surface.height,
            fps = job.fps,
            "ffmpeg capture started"
        );

        self.output = Some(job.output_path.clone());
        self.running = Some(RunningEncode {
            child,
            stdin,
            stderr_task,
            surface: job.surface,
            frames: 0,
        });
        Ok(())
    }

    fn push_frame(&mut self, frame: &RgbaImage) -> TalkpicResult<()> {
        let running = self
            .running
            .as_mut()
            .ok_or_else(|| TalkpicError::illegal_state("No ffmpeg capture in progress"))?;

        if frame.dimensions() != (running.surface.width, running.surface.height) {
            return Err(TalkpicError::render(format!(
                "Frame is {}x{}, capture expects {}x{}",
                frame.width(),
                frame.height(),
                running.surface.width,
                running.surface.height
            )));
        }

        let stdin = running
            .stdin
            .as_mut()
            .ok_or_else(|| TalkpicError::render("ffmpeg stdin already closed"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| TalkpicError::render(format!("ffmpeg stopped accepting frames: {e}")))?;
        running.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> TalkpicResult<()> {
        let mut running = self
            .running
            .take()
            .ok_or_else(|| TalkpicError::illegal_state("No ffmpeg capture in progress"))?;

        // Closing stdin signals end of stream.
        drop(running.stdin.take());
        let status = running
            .child
            .wait()
            .map_err(|e| TalkpicError::render(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = join_stderr(&mut running);

        if !status.success() {
            return Err(TalkpicError::render(format!(
                "ffmpeg capture failed (status {status}): {}",
                stderr_output.trim()
            )));
        }

        tracing::info!(frames = running.frames, "ffmpeg capture finished");
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(mut running) = self.running.take() {
            drop(running.stdin.take());
            if let Err(err) = running.child.kill() {
                tracing::debug!(error = %err, "ffmpeg already exited");
            }
            let _ = running.child.wait();
            let _ = join_stderr(&mut running);
            tracing::warn!(frames = running.frames, "ffmpeg capture aborted");
        }
        if let Some(path) = &self.output {
            if path.exists() {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::warn!(error = %err, path = %path.display(), "Failed to remove partial output");
                }
            }
        }
    }

    fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    fn is_active(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            tracing::warn!(
                pid = running.child.id(),
                "ffmpeg capture dropped without finalize, killing encoder"
            );
            drop(running.stdin.take());
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

fn join_stderr(running: &mut RunningEncode) -> String {
    running
        .stderr_task
        .take()
        .map(|task| {
            task.join()
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
        })
        .unwrap_or_default()
}

/// Full ffmpeg argument list for a capture job.
pub fn build_ffmpeg_args(job: &CaptureJob) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", job.surface.width, job.surface.height),
        "-framerate".into(),
        job.fps.max(1).to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-i".into(),
        job.audio_path.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        // yuv420p needs even dimensions.
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
    ];
    args.extend(codec_args(job));
    args.push("-shortest".into());
    args.push(job.output_path.to_string_lossy().into_owned());
    args
}

fn codec_args(job: &CaptureJob) -> Vec<String> {
    let video_bitrate = format!("{}k", job.video_bitrate_kbps.max(100));
    let audio_bitrate = format!("{}k", job.audio_bitrate_kbps.max(32));

    match job.format {
        ExportFormat::Mp4H264 => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-b:v".to_string(),
            video_bitrate,
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            audio_bitrate,
            "-movflags".to_string(),
            "+faststart".to_string(),
        ],
        ExportFormat::Webm => vec![
            "-c:v".to_string(),
            "libvpx-vp9".to_string(),
            "-deadline".to_string(),
            "realtime".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-b:v".to_string(),
            video_bitrate,
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            audio_bitrate,
        ],
    }
}

fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Encoder whose output size follows a scripted sequence of probes.
    struct ScriptedEncoder {
        path: PathBuf,
        sizes: Vec<Option<u64>>,
        probes: Cell<usize>,
        fail_finish: bool,
        finished: bool,
    }

    impl ScriptedEncoder {
        fn new(sizes: Vec<Option<u64>>) -> Self {
            Self {
                path: PathBuf::from("/tmp/scripted.mp4"),
                sizes,
                probes: Cell::new(0),
                fail_finish: false,
                finished: false,
            }
        }
    }

    impl FrameEncoder for ScriptedEncoder {
        fn name(&self) -> &str {
            "scripted"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn supports(&self, format: ExportFormat) -> bool {
            format == ExportFormat::Webm
        }
        fn begin(&mut self, _job: &CaptureJob) -> TalkpicResult<()> {
            Ok(())
        }
        fn push_frame(&mut self, _frame: &RgbaImage) -> TalkpicResult<()> {
            Ok(())
        }
        fn finish(&mut self) -> TalkpicResult<()> {
            if self.fail_finish {
                return Err(TalkpicError::render("boom"));
            }
            self.finished = true;
            Ok(())
        }
        fn abort(&mut self) {}
        fn output_path(&self) -> Option<&Path> {
            Some(&self.path)
        }
        fn output_size(&self) -> Option<u64> {
            let i = self.probes.get();
            self.probes.set(i + 1);
            self.sizes
                .get(i)
                .or_else(|| self.sizes.last())
                .copied()
                .flatten()
        }
        fn is_active(&self) -> bool {
            !self.finished
        }
    }

    fn fast_policy() -> FinalizePolicy {
        FinalizePolicy {
            retry_delay: Duration::from_millis(1),
            ..FinalizePolicy::default()
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("MP4".parse::<ExportFormat>().unwrap(), ExportFormat::Mp4H264);
        assert_eq!("webm".parse::<ExportFormat>().unwrap(), ExportFormat::Webm);
        assert!("avi".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output_name(ExportFormat::Webm, 1_700_000_000_123),
            "lip-sync-animation-1700000000123.webm"
        );
    }

    #[test]
    fn test_ffmpeg_args_stream_rgba_and_mux_audio() {
        let job = CaptureJob::new(
            "/out/clip.mp4",
            "/in/voice.wav",
            Size::new(721, 480),
            24,
            ExportFormat::Mp4H264,
        );
        let args = build_ffmpeg_args(&job);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 721x480 -framerate 24 -i pipe:0"));
        assert!(joined.contains("-i /in/voice.wav"));
        assert!(joined.contains("-b:v 2500k"));
        assert!(joined.contains("-b:a 128k"));
        assert!(joined.contains("libx264"));
        assert_eq!(args.last().map(String::as_str), Some("/out/clip.mp4"));
    }

    #[test]
    fn test_negotiate_falls_back() {
        let encoder = ScriptedEncoder::new(vec![]);
        assert_eq!(
            negotiate_format(&encoder, ExportFormat::Mp4H264).unwrap(),
            ExportFormat::Webm
        );
    }

    #[tokio::test]
    async fn test_finalize_waits_for_readable_output() {
        let mut encoder = ScriptedEncoder::new(vec![None, Some(512), Some(50_000)]);
        let media = finalize_capture(&mut encoder, ExportFormat::Mp4H264, &fast_policy())
            .await
            .unwrap();
        assert_eq!(media.bytes, 50_000);
        assert_eq!(encoder.probes.get(), 3);
    }

    #[tokio::test]
    async fn test_finalize_reports_empty_output_after_all_attempts() {
        let mut encoder = ScriptedEncoder::new(vec![None]);
        let err = finalize_capture(&mut encoder, ExportFormat::Mp4H264, &fast_policy())
            .await
            .unwrap_err();
        match err {
            TalkpicError::CaptureFailure {
                bytes, attempts, ..
            } => {
                assert_eq!(bytes, None);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_finalize_rejects_truncated_output() {
        let mut encoder = ScriptedEncoder::new(vec![Some(4096)]);
        let err = finalize_capture(&mut encoder, ExportFormat::Webm, &fast_policy())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        let text = err.to_string();
        assert!(text.contains("4.0 KB"));
        assert!(text.contains("1 attempt(s)"));
        assert!(text.contains("shorter"));
    }

    #[test]
    fn test_missing_ffmpeg_fails_to_begin() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = FfmpegEncoder::with_binary("/nonexistent/ffmpeg");
        assert!(!encoder.is_available());
        assert!(!encoder.supports(ExportFormat::Mp4H264));

        let output = default_output_path(&dir.path().join("exports"), ExportFormat::Mp4H264);
        assert!(output.starts_with(dir.path().join("exports")));
        let job = CaptureJob::new(
            &output,
            dir.path().join("voice.wav"),
            Size::new(64, 64),
            24,
            ExportFormat::Mp4H264,
        );
        assert!(matches!(
            encoder.begin(&job),
            Err(TalkpicError::Render { .. })
        ));
        assert!(!encoder.is_active());
        assert!(matches!(
            encoder.push_frame(&RgbaImage::new(64, 64)),
            Err(TalkpicError::IllegalState { .. })
        ));
    }

    #[tokio::test]
    async fn test_finalize_surfaces_encoder_failure() {
        let mut encoder = ScriptedEncoder::new(vec![None]);
        encoder.fail_finish = true;
        let err = finalize_capture(&mut encoder, ExportFormat::Webm, &fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, TalkpicError::CaptureFailure { .. }));
    }
}
