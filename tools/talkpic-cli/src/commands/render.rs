//! Capture a scene to a video file.

use std::path::PathBuf;

use talkpic_common::config::AppConfig;
use talkpic_common::TalkpicError;
use talkpic_playback_engine::{Pacing, RecordRequest, RunEnd};
use talkpic_render_engine::{
    default_output_path, negotiate_format, ExportFormat, FfmpegEncoder, FrameEncoder,
};

use super::{build_clock, open_session, SceneArgs};

pub async fn run(
    args: SceneArgs,
    output: Option<PathBuf>,
    format: Option<String>,
    realtime: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("Rendering scene: {}", args.scene.display());

    let preferred: ExportFormat = format
        .as_deref()
        .unwrap_or(config.export.format.as_str())
        .parse()?;

    let mut encoder = FfmpegEncoder::new();
    if !encoder.is_available() {
        anyhow::bail!("ffmpeg not found on PATH. Install ffmpeg and run `talkpic check`.");
    }
    let format = negotiate_format(&encoder, preferred)?;
    let output_path = output.unwrap_or_else(|| default_output_path(&config.output_dir, format));

    let pacing = if realtime {
        Pacing::Realtime
    } else {
        Pacing::Offline
    };
    let clock = build_clock(&args, config, pacing);
    let (_scene, mut session) = open_session(&args, true).await?;
    let surface = clock.config().surface;

    println!("  Output: {}", output_path.display());
    println!("  Format: {format}");
    println!(
        "  Surface: {}x{} @ {}fps",
        surface.width,
        surface.height,
        clock.config().fps
    );
    if let Some(track) = session.audio() {
        println!("  Track: {:.1}s", track.duration_secs());
    }

    let request = RecordRequest::from_defaults(&output_path, format, &config.export);
    match clock.record(&mut session, &mut encoder, &request).await {
        Ok(recording) => {
            if recording.summary.end == RunEnd::Stopped {
                println!("Stopped early; the video covers the frames rendered so far.");
            }
            println!(
                "Export complete: {} ({:.1} MB, {} frames, {} blinks)",
                recording.media.path.display(),
                recording.media.bytes as f64 / (1024.0 * 1024.0),
                recording.summary.frames,
                recording.summary.completed_blinks
            );
            Ok(())
        }
        Err(err @ TalkpicError::CaptureFailure { .. }) => {
            println!("Export failed: {err}");
            println!("The recording can be retried; a shorter audio track is more reliable.");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
