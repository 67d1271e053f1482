//! Real-time playback with a terminal meter.

use std::io::Write;

use image::RgbaImage;
use talkpic_animation_core::BlinkPhase;
use talkpic_common::config::AppConfig;
use talkpic_common::RateController;
use talkpic_playback_engine::{FrameInfo, Pacing, PreviewSink, RunEnd};

use super::{build_clock, open_session, SceneArgs};

const METER_WIDTH: usize = 30;
const METER_HZ: u32 = 15;

pub async fn run(args: SceneArgs, config: &AppConfig) -> anyhow::Result<()> {
    let clock = build_clock(&args, config, Pacing::Realtime);
    let (scene, mut session) = open_session(&args, true).await?;

    println!("Playing {} (Ctrl+C to stop)", scene.path.display());
    let eyes = if session.anchors().eyes_present() {
        "blinking"
    } else {
        "no eye regions, blinking off"
    };
    println!("  Eyes: {eyes}");

    let mut rate = RateController::new(METER_HZ);
    let mut sink = PreviewSink::new(|info: &FrameInfo, _frame: &RgbaImage| {
        if rate.should_tick(info.time_ms) {
            print!("\r{}", meter_line(info));
            std::io::stdout().flush().ok();
        }
    });

    let summary = clock.play(&mut session, &mut sink).await?;
    println!();
    match summary.end {
        RunEnd::TrackEnded => println!("Track finished."),
        RunEnd::Stopped => println!("Stopped."),
    }
    println!(
        "  {} frames, {:.1}s, {} blinks, peak opening {:.2}",
        summary.frames,
        summary.duration_ms / 1000.0,
        summary.completed_blinks,
        summary.peak_opening
    );
    Ok(())
}

fn meter_line(info: &FrameInfo) -> String {
    let filled = (info.opening * METER_WIDTH as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "#".repeat(filled.min(METER_WIDTH)),
        " ".repeat(METER_WIDTH - filled.min(METER_WIDTH))
    );
    let eyes = match info.blink_phase {
        BlinkPhase::Idle => "open   ",
        BlinkPhase::Closing => "closing",
        BlinkPhase::Opening => "opening",
    };
    format!(
        "  {:>6.1}s  mouth [{bar}] {:.2}  eyes {eyes}  {}",
        info.time_ms / 1000.0,
        info.opening,
        if info.speaking { "speaking" } else { "        " }
    )
}
