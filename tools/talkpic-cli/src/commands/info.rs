//! Show scene information.

use talkpic_animation_core::{AnchorOrigin, ResolvedAnchor};
use talkpic_common::config::AppConfig;
use talkpic_face_model::RegionKind;
use talkpic_playback_engine::DetectionState;

use super::{open_session, SceneArgs};

pub async fn run(args: SceneArgs, config: &AppConfig) -> anyhow::Result<()> {
    let (loaded, session) = open_session(&args, true).await?;
    let scene = &loaded.scene;

    println!("Scene: {}", loaded.path.display());
    println!("  Version: {}", scene.version);
    println!("  Image: {}", loaded.image_path().display());
    println!("  Audio: {}", loaded.audio_path().display());
    println!();

    if let Some(image) = session.image() {
        let size = image.size();
        println!("Image: {}x{}", size.width, size.height);
    }
    if let Some(track) = session.audio() {
        println!(
            "Track: {:.1}s, {} Hz, {} channel(s){}",
            track.duration_secs(),
            track.sample_rate(),
            track.channels(),
            if track.is_long() {
                " (long; capture may truncate)"
            } else {
                ""
            }
        );
    }
    match session.detection() {
        DetectionState::Resolved(Some(det)) => println!(
            "Detection: mouth at ({:.0}, {:.0}), {:.0}x{:.0} px",
            det.center.x, det.center.y, det.width, det.height
        ),
        DetectionState::Resolved(None) => println!("Detection: none (heuristic mouth)"),
        DetectionState::Pending => println!("Detection: pending"),
    }
    println!();

    let settings = session.settings();
    println!("Sliders:");
    println!("  Sensitivity: {}", settings.sensitivity);
    println!("  Mouth size: {}", settings.size_multiplier);
    println!();

    let surface = args.surface(config);
    let anchors = session.resolve_anchors(surface)?;
    println!("Anchors on {}x{}:", surface.width, surface.height);
    for (kind, resolved) in [
        (RegionKind::Mouth, anchors.mouth),
        (RegionKind::LeftEye, anchors.left_eye),
        (RegionKind::RightEye, anchors.right_eye),
    ] {
        println!("  {:<10} {}", kind.label(), describe(resolved.as_ref()));
    }
    if anchors.eyes().is_none() {
        println!("  Blinking is off until both eyes are selected.");
    }

    Ok(())
}

fn describe(anchor: Option<&ResolvedAnchor>) -> String {
    let Some(anchor) = anchor else {
        return "none".to_string();
    };
    let origin = match anchor.origin {
        AnchorOrigin::Manual => "manual",
        AnchorOrigin::Detected => "detected",
        AnchorOrigin::Heuristic => "heuristic",
    };
    let e = &anchor.ellipse;
    format!(
        "{origin}: center ({:.1}, {:.1}), radii {:.1} x {:.1}",
        e.cx, e.cy, e.rx, e.ry
    )
}
