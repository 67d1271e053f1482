//! Check encoder availability.

use talkpic_common::config::{config_file_path, AppConfig};
use talkpic_render_engine::{ExportFormat, FfmpegEncoder, FrameEncoder};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("talkpic System Check");
    println!("{}", "=".repeat(50));

    let encoder = FfmpegEncoder::new();
    if !encoder.is_available() {
        println!("[FAIL] ffmpeg: not found on PATH");
        println!();
        println!("Install ffmpeg to export videos. Playback and snapshots still work.");
        return Ok(());
    }
    println!("[OK] ffmpeg: available");

    let mut any = false;
    for format in [ExportFormat::Mp4H264, ExportFormat::Webm] {
        if encoder.supports(format) {
            any = true;
            println!("[OK] {format}: {}", format.video_codec());
        } else {
            println!("[WARN] {format}: {} not available", format.video_codec());
        }
    }

    println!();
    println!("Configuration: {}", config_file_path().display());
    println!("  Output dir: {}", config.output_dir.display());
    println!(
        "  Surface: {}x{} @ {}fps",
        config.surface.width, config.surface.height, config.surface.fps
    );
    println!(
        "  Export: {} ({} kbps video, {} kbps audio)",
        config.export.format, config.export.video_bitrate_kbps, config.export.audio_bitrate_kbps
    );

    println!();
    if any {
        println!("talkpic is ready to export.");
    } else {
        println!("ffmpeg has neither libx264 nor libvpx-vp9. Install a full ffmpeg build.");
    }

    Ok(())
}
