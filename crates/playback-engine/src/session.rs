//! The session context: loaded assets, anchors, sliders, and run state.
//!
//! Everything here is plain owned state behind `&mut self`. The clock takes
//! the session for the duration of a run, so a second run cannot start while
//! one is active; the [`SessionState`] check turns any attempt that gets
//! through into an [`TalkpicError::IllegalState`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use talkpic_animation_core::{resolve_all, ResolvedAnchors};
use talkpic_common::config::AnimationDefaults;
use talkpic_common::{TalkpicError, TalkpicResult};
use talkpic_face_model::{
    AnchorRegion, AnchorSet, DetectionResult, PixelRect, RegionKind, SelectionError,
    SelectionStep, Size,
};

use crate::audio::AudioTrack;
use crate::detector::{detect_or_degrade, FaceDetector};

/// The two user sliders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationSettings {
    pub sensitivity: f64,
    pub size_multiplier: f64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self::from(&AnimationDefaults::default())
    }
}

impl From<&AnimationDefaults> for AnimationSettings {
    fn from(defaults: &AnimationDefaults) -> Self {
        Self {
            sensitivity: defaults.sensitivity,
            size_multiplier: defaults.size_multiplier,
        }
    }
}

/// Outcome of the detector attempt for the current image.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DetectionState {
    /// No image yet, or the attempt has not finished.
    #[default]
    Pending,
    /// The attempt finished. `None` covers no detector, failure, and no face.
    Resolved(Option<DetectionResult>),
}

impl DetectionState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, DetectionState::Resolved(_))
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        match self {
            DetectionState::Resolved(result) => result.as_ref(),
            DetectionState::Pending => None,
        }
    }
}

/// What the session is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Playing,
    Recording,
}

/// A decoded base image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub path: Option<PathBuf>,
    pub pixels: Arc<RgbaImage>,
}

impl LoadedImage {
    pub fn size(&self) -> Size {
        Size::new(self.pixels.width(), self.pixels.height())
    }
}

/// Animation session state.
#[derive(Debug, Default)]
pub struct Session {
    image: Option<LoadedImage>,
    audio: Option<AudioTrack>,
    detection: DetectionState,
    anchors: AnchorSet,
    settings: AnimationSettings,
    initial_settings: AnimationSettings,
    selection: SelectionStep,
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the given slider values, checked like the setters check them.
    pub fn with_settings(settings: AnimationSettings) -> TalkpicResult<Self> {
        let mut session = Self::default();
        session.set_sensitivity(settings.sensitivity)?;
        session.set_size_multiplier(settings.size_multiplier)?;
        session.initial_settings = session.settings;
        Ok(session)
    }

    /// Decode an image and run the detector against it.
    ///
    /// Manual anchors and the selection cursor are cleared: they were drawn
    /// over the previous picture.
    pub async fn load_image(
        &mut self,
        path: impl AsRef<Path>,
        detector: Option<&dyn FaceDetector>,
    ) -> TalkpicResult<()> {
        self.require_idle("load an image")?;
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(TalkpicError::FileNotFound { path });
        }

        let decode_path = path.clone();
        let pixels = tokio::task::spawn_blocking(move || image::open(&decode_path))
            .await
            .map_err(|e| TalkpicError::render(format!("Image decode task failed: {e}")))?
            .map_err(|e| {
                TalkpicError::input_unavailable(format!("image {}: {e}", path.display()))
            })?
            .to_rgba8();

        tracing::info!(
            path = %path.display(),
            width = pixels.width(),
            height = pixels.height(),
            "Image loaded"
        );
        self.install_image(Some(path), pixels, detector).await
    }

    /// Install already-decoded pixels as the base image.
    pub async fn load_image_pixels(
        &mut self,
        pixels: RgbaImage,
        detector: Option<&dyn FaceDetector>,
    ) -> TalkpicResult<()> {
        self.require_idle("load an image")?;
        self.install_image(None, pixels, detector).await
    }

    async fn install_image(
        &mut self,
        path: Option<PathBuf>,
        pixels: RgbaImage,
        detector: Option<&dyn FaceDetector>,
    ) -> TalkpicResult<()> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(TalkpicError::input_unavailable("image has no pixels"));
        }
        let pixels = Arc::new(pixels);

        self.anchors.clear_all();
        self.selection = SelectionStep::default();
        self.detection = DetectionState::Pending;
        self.image = Some(LoadedImage {
            path,
            pixels: Arc::clone(&pixels),
        });

        let result = detect_or_degrade(detector, &pixels).await;
        self.detection = DetectionState::Resolved(result);
        Ok(())
    }

    /// Decode and attach an audio track.
    pub async fn load_audio(&mut self, path: impl AsRef<Path>) -> TalkpicResult<()> {
        self.require_idle("load audio")?;
        let track = AudioTrack::load(path).await?;
        self.audio = Some(track);
        Ok(())
    }

    /// Attach an already-decoded track.
    pub fn load_audio_track(&mut self, track: AudioTrack) -> TalkpicResult<()> {
        self.require_idle("load audio")?;
        self.audio = Some(track);
        Ok(())
    }

    /// Store a manual region. On rejection the previous region stays.
    pub fn confirm_region(&mut self, kind: RegionKind, region: AnchorRegion) -> TalkpicResult<()> {
        self.anchors
            .confirm(kind, region)
            .map_err(|e| selection_error(kind, e))?;
        tracing::debug!(
            region = kind.label(),
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "Region confirmed"
        );
        Ok(())
    }

    /// Store a manual region from a drag rectangle on `surface`.
    pub fn confirm_pixel_selection(
        &mut self,
        kind: RegionKind,
        rect: PixelRect,
        surface: Size,
    ) -> TalkpicResult<()> {
        let region =
            AnchorRegion::from_pixel_rect(rect, surface).map_err(|e| selection_error(kind, e))?;
        self.confirm_region(kind, region)
    }

    pub fn clear_region(&mut self, kind: RegionKind) {
        self.anchors.clear(kind);
    }

    /// Clear whatever region the selection cursor points at.
    pub fn clear_current_selection(&mut self) {
        if let Some(kind) = self.selection.kind() {
            self.clear_region(kind);
        }
    }

    /// Put the cursor back on the first region that still needs a selection.
    pub fn resume_selection(&mut self) -> SelectionStep {
        self.selection = SelectionStep::resume(&self.anchors);
        self.selection
    }

    /// Move the selection cursor forward.
    ///
    /// Leaving the last step requires all three regions.
    pub fn advance_selection(&mut self) -> TalkpicResult<SelectionStep> {
        let next = self.selection.next();
        if next == SelectionStep::Complete && !self.anchors.is_complete() {
            let missing: Vec<&str> = RegionKind::ALL
                .into_iter()
                .filter(|kind| self.anchors.get(*kind).is_none())
                .map(|kind| kind.label())
                .collect();
            return Err(TalkpicError::selection(format!(
                "select the {} before finishing",
                missing.join(" and ")
            )));
        }
        self.selection = next;
        Ok(next)
    }

    pub fn selection_step(&self) -> SelectionStep {
        self.selection
    }

    pub fn selection_complete(&self) -> bool {
        self.anchors.is_complete()
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) -> TalkpicResult<()> {
        if !sensitivity.is_finite() || sensitivity < 0.0 {
            return Err(TalkpicError::config(format!(
                "sensitivity must be a non-negative number, got {sensitivity}"
            )));
        }
        self.settings.sensitivity = sensitivity;
        Ok(())
    }

    pub fn set_size_multiplier(&mut self, multiplier: f64) -> TalkpicResult<()> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(TalkpicError::config(format!(
                "mouth size multiplier must be positive, got {multiplier}"
            )));
        }
        self.settings.size_multiplier = multiplier;
        Ok(())
    }

    /// Image and audio loaded, and the detector attempt finished.
    pub fn is_ready(&self) -> bool {
        self.image.is_some() && self.audio.is_some() && self.detection.is_resolved()
    }

    pub fn ensure_ready(&self) -> TalkpicResult<()> {
        if self.image.is_none() {
            return Err(TalkpicError::input_unavailable("no image loaded"));
        }
        if self.audio.is_none() {
            return Err(TalkpicError::input_unavailable("no audio track loaded"));
        }
        if !self.detection.is_resolved() {
            return Err(TalkpicError::illegal_state(
                "face detection has not finished for the current image",
            ));
        }
        Ok(())
    }

    /// Effective anchors on `surface` for the current frame.
    pub fn resolve_anchors(&self, surface: Size) -> TalkpicResult<ResolvedAnchors> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| TalkpicError::illegal_state("cannot resolve anchors without an image"))?;
        Ok(resolve_all(
            &self.anchors,
            self.detection.result(),
            surface,
            image.size(),
            self.settings.size_multiplier,
        ))
    }

    /// Drop assets, detection, and every anchor, and put the sliders back.
    pub fn reset(&mut self) -> TalkpicResult<()> {
        self.require_idle("reset")?;
        self.settings = self.initial_settings;
        self.image = None;
        self.audio = None;
        self.detection = DetectionState::Pending;
        self.anchors.clear_all();
        self.selection = SelectionStep::default();
        tracing::info!("Session reset");
        Ok(())
    }

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    pub fn detection(&self) -> &DetectionState {
        &self.detection
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn settings(&self) -> AnimationSettings {
        self.settings
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn begin_run(&mut self, next: SessionState) -> TalkpicResult<()> {
        if self.state != SessionState::Idle {
            return Err(TalkpicError::illegal_state(format!(
                "cannot start {next:?} while {:?}",
                self.state
            )));
        }
        self.ensure_ready()?;
        self.state = next;
        Ok(())
    }

    pub(crate) fn end_run(&mut self) {
        self.state = SessionState::Idle;
    }

    fn require_idle(&self, action: &str) -> TalkpicResult<()> {
        if self.state != SessionState::Idle {
            return Err(TalkpicError::illegal_state(format!(
                "cannot {action} while {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

fn selection_error(kind: RegionKind, err: SelectionError) -> TalkpicError {
    TalkpicError::selection(format!("{}: {err}", kind.label()))
}
