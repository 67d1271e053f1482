//! Face detection backends.
//!
//! Detection is best effort. A missing backend, a backend error, and an
//! image without a face all end the same way: no detection, and the
//! animation falls back to the heuristic mouth.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::Deserialize;
use talkpic_common::{TalkpicError, TalkpicResult};
use talkpic_face_model::{DetectionResult, Point2D};

/// Abstract interface for landmark detectors.
#[async_trait::async_trait]
pub trait FaceDetector: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Find the mouth in `image`. `Ok(None)` means no face was found.
    async fn detect(&self, image: &RgbaImage) -> TalkpicResult<Option<DetectionResult>>;
}

/// Run `detector` (if any) and fold every failure mode into `None`.
pub async fn detect_or_degrade(
    detector: Option<&dyn FaceDetector>,
    image: &RgbaImage,
) -> Option<DetectionResult> {
    let Some(detector) = detector else {
        tracing::debug!("No face detector configured, using heuristic mouth");
        return None;
    };

    match detector.detect(image).await {
        Ok(Some(result)) => {
            tracing::info!(
                detector = detector.name(),
                center_x = result.center.x,
                center_y = result.center.y,
                width = result.width,
                height = result.height,
                "Mouth detected"
            );
            Some(result)
        }
        Ok(None) => {
            tracing::warn!(detector = detector.name(), "No face found, using heuristic mouth");
            None
        }
        Err(err) => {
            tracing::warn!(
                detector = detector.name(),
                error = %err,
                "Face detection failed, using heuristic mouth"
            );
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct LandmarkFile {
    #[serde(default)]
    landmarks: Vec<Point2D>,
}

/// Reads precomputed landmarks from a JSON sidecar:
/// `{"landmarks": [{"x": .., "y": ..}, ...]}` in image pixels.
#[derive(Debug, Clone)]
pub struct LandmarkFileDetector {
    path: PathBuf,
}

impl LandmarkFileDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Detector for the conventional sidecar next to an image, if present.
    pub fn for_image(image_path: &Path) -> Option<Self> {
        let sidecar = sidecar_path(image_path);
        sidecar.exists().then(|| Self::new(sidecar))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl FaceDetector for LandmarkFileDetector {
    fn name(&self) -> &str {
        "landmark-file"
    }

    async fn detect(&self, image: &RgbaImage) -> TalkpicResult<Option<DetectionResult>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            TalkpicError::detection(format!(
                "Failed to read landmarks {}: {e}",
                self.path.display()
            ))
        })?;
        let parsed: LandmarkFile = serde_json::from_str(&content).map_err(|e| {
            TalkpicError::detection(format!(
                "Malformed landmarks {}: {e}",
                self.path.display()
            ))
        })?;

        let (width, height) = (image.width() as f64, image.height() as f64);
        let outside = parsed
            .landmarks
            .iter()
            .filter(|p| p.x < 0.0 || p.y < 0.0 || p.x > width || p.y > height)
            .count();
        if outside > 0 {
            tracing::debug!(outside, "Some landmarks fall outside the image");
        }

        Ok(DetectionResult::from_landmarks(&parsed.landmarks))
    }
}

/// `face.png` → `face.landmarks.json`
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("landmarks.json")
}
