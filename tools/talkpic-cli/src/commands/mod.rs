pub mod check;
pub mod info;
pub mod init;
pub mod play;
pub mod render;
pub mod snapshot;

use std::path::PathBuf;

use clap::Args;
use talkpic_common::config::AppConfig;
use talkpic_face_model::{LoadedScene, RegionKind, Size};
use talkpic_playback_engine::{
    AnimationClock, AnimationSettings, ClockConfig, FaceDetector, LandmarkFileDetector, Pacing,
    Session,
};

/// Scene and rendering options shared by the scene commands.
#[derive(Args, Debug, Clone)]
pub struct SceneArgs {
    /// Path to scene.json
    pub scene: PathBuf,

    /// Surface width (default from config)
    #[arg(long)]
    pub width: Option<u32>,

    /// Surface height (default from config)
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second (default from config)
    #[arg(long)]
    pub fps: Option<u32>,

    /// Mouth sensitivity (overrides the scene)
    #[arg(long)]
    pub sensitivity: Option<f64>,

    /// Mouth size multiplier (overrides the scene)
    #[arg(long)]
    pub size: Option<f64>,

    /// Landmark JSON file (default: <image>.landmarks.json when present)
    #[arg(long)]
    pub landmarks: Option<PathBuf>,
}

impl SceneArgs {
    pub fn surface(&self, config: &AppConfig) -> Size {
        Size::new(
            self.width.unwrap_or(config.surface.width),
            self.height.unwrap_or(config.surface.height),
        )
    }

    pub fn clock_config(&self, config: &AppConfig, pacing: Pacing) -> ClockConfig {
        let mut clock = ClockConfig::from_app_config(config).with_pacing(pacing);
        clock.surface = self.surface(config);
        clock.fps = self.fps.unwrap_or(config.surface.fps).max(1);
        clock
    }
}

/// Load a scene manifest, reporting missing media.
pub fn load_scene(args: &SceneArgs) -> anyhow::Result<LoadedScene> {
    let loaded = LoadedScene::load(&args.scene)
        .map_err(|e| anyhow::anyhow!("Failed to load scene: {e}"))?;
    let missing = loaded.missing_media();
    if !missing.is_empty() {
        anyhow::bail!("Scene is incomplete:\n  {}", missing.join("\n  "));
    }
    Ok(loaded)
}

/// Build a session from a scene: image (with detection), optionally the
/// audio track, the scene's anchors, and the slider values.
pub async fn open_session(
    args: &SceneArgs,
    with_audio: bool,
) -> anyhow::Result<(LoadedScene, Session)> {
    let loaded = load_scene(args)?;
    let scene = &loaded.scene;

    let mut session = Session::with_settings(AnimationSettings {
        sensitivity: scene.sensitivity,
        size_multiplier: scene.size_multiplier,
    })?;
    if let Some(sensitivity) = args.sensitivity {
        session.set_sensitivity(sensitivity)?;
    }
    if let Some(size) = args.size {
        session.set_size_multiplier(size)?;
    }

    let image_path = loaded.image_path();
    let detector = match &args.landmarks {
        Some(path) => Some(LandmarkFileDetector::new(path)),
        None => LandmarkFileDetector::for_image(&image_path),
    };
    let detector_ref = detector.as_ref().map(|d| d as &dyn FaceDetector);
    session.load_image(&image_path, detector_ref).await?;

    if with_audio {
        session.load_audio(loaded.audio_path()).await?;
    }

    for kind in RegionKind::ALL {
        if let Some(region) = scene.anchors.get(kind) {
            session.confirm_region(kind, *region)?;
        }
    }
    session.resume_selection();

    Ok((loaded, session))
}

/// Build the clock for a scene command. Real-time runs sound the track on
/// the speakers when the binary is built with them.
pub fn build_clock(args: &SceneArgs, config: &AppConfig, pacing: Pacing) -> AnimationClock {
    let clock = AnimationClock::new(args.clock_config(config, pacing));
    #[cfg(feature = "speaker")]
    let clock = clock.with_audio_output(std::sync::Arc::new(
        talkpic_playback_engine::SpeakerOutput::new(),
    ));
    stop_on_ctrl_c(&clock);
    clock
}

/// Ctrl+C stops the clock, including while the scene is still loading.
fn stop_on_ctrl_c(clock: &AnimationClock) {
    let stop = clock.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });
}
