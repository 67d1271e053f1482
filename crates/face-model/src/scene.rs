//! Scene manifest (`scene.json`).
//!
//! A scene ties a portrait, a voice track, and the anchor selections made
//! for that portrait together so a render can be repeated from the command
//! line. Media paths are stored relative to the manifest's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::region::{AnchorSet, RegionKind, SelectionError};

/// Current manifest schema version.
pub const SCENE_VERSION: &str = "1.0";

/// Errors loading or saving a scene.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid {} anchor: {source}", .kind.label())]
    InvalidAnchor {
        kind: RegionKind,
        source: SelectionError,
    },

    #[error("Invalid {name} value: {value}")]
    InvalidSlider { name: &'static str, value: f64 },
}

/// The manifest as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Schema version.
    pub version: String,

    /// Portrait image path.
    pub image: PathBuf,

    /// Voice track path (WAV).
    pub audio: PathBuf,

    /// Manual anchor selections.
    #[serde(default)]
    pub anchors: AnchorSet,

    /// Mouth sensitivity slider.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Mouth size slider.
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

fn default_sensitivity() -> f64 {
    1.5
}

fn default_size_multiplier() -> f64 {
    1.0
}

impl Scene {
    pub fn new(image: impl Into<PathBuf>, audio: impl Into<PathBuf>) -> Self {
        Self {
            version: SCENE_VERSION.to_string(),
            image: image.into(),
            audio: audio.into(),
            anchors: AnchorSet::default(),
            sensitivity: default_sensitivity(),
            size_multiplier: default_size_multiplier(),
        }
    }

    /// Sensitivity must be finite and non-negative; mouth size finite and positive.
    pub fn validate_sliders(&self) -> Result<(), SceneError> {
        if !self.sensitivity.is_finite() || self.sensitivity < 0.0 {
            return Err(SceneError::InvalidSlider {
                name: "sensitivity",
                value: self.sensitivity,
            });
        }
        if !self.size_multiplier.is_finite() || self.size_multiplier <= 0.0 {
            return Err(SceneError::InvalidSlider {
                name: "size_multiplier",
                value: self.size_multiplier,
            });
        }
        Ok(())
    }
}

/// A scene together with the location it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    /// Path of the manifest file.
    pub path: PathBuf,

    pub scene: Scene,
}

impl LoadedScene {
    /// Load and validate a manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| SceneError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let scene: Scene = serde_json::from_str(&json).map_err(|e| SceneError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        scene
            .anchors
            .validate()
            .map_err(|(kind, source)| SceneError::InvalidAnchor { kind, source })?;
        scene.validate_sliders()?;

        Ok(Self { path, scene })
    }

    /// Write the manifest back to its path.
    pub fn save(&self) -> Result<(), SceneError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SceneError::IoError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        let json =
            serde_json::to_string_pretty(&self.scene).map_err(|e| SceneError::ParseError {
                path: self.path.clone(),
                source: e,
            })?;
        std::fs::write(&self.path, json).map_err(|e| SceneError::IoError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Directory that relative media paths are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Absolute-or-relative path to the portrait.
    pub fn image_path(&self) -> PathBuf {
        resolve(&self.base_dir(), &self.scene.image)
    }

    /// Absolute-or-relative path to the voice track.
    pub fn audio_path(&self) -> PathBuf {
        resolve(&self.base_dir(), &self.scene.audio)
    }

    /// List referenced media files that do not exist.
    pub fn missing_media(&self) -> Vec<String> {
        let mut missing = vec![];
        for (label, path) in [("image", self.image_path()), ("audio", self.audio_path())] {
            if !path.exists() {
                missing.push(format!("{label} file missing: {}", path.display()));
            }
        }
        missing
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::AnchorRegion;

    #[test]
    fn test_scene_roundtrip_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = Scene::new("face.png", "voice.wav");
        scene.anchors.mouth = Some(AnchorRegion::new(0.4, 0.6, 0.2, 0.1).unwrap());
        let loaded = LoadedScene {
            path: dir.path().join("scene.json"),
            scene: scene.clone(),
        };
        loaded.save().unwrap();

        let reloaded = LoadedScene::load(dir.path().join("scene.json")).unwrap();
        assert_eq!(reloaded.scene, scene);
        assert_eq!(reloaded.image_path(), dir.path().join("face.png"));
        assert_eq!(reloaded.missing_media().len(), 2);
    }

    #[test]
    fn test_defaults_for_sliders() {
        let json = r#"{ "version": "1.0", "image": "a.png", "audio": "a.wav" }"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.sensitivity, 1.5);
        assert_eq!(scene.size_multiplier, 1.0);
        assert!(scene.anchors.mouth.is_none());
    }

    #[test]
    fn test_invalid_anchor_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(
            &path,
            r#"{ "version": "1.0", "image": "a.png", "audio": "a.wav",
                 "anchors": { "left_eye": { "x": 0.9, "y": 0.1, "width": 0.3, "height": 0.1 } } }"#,
        )
        .unwrap();
        match LoadedScene::load(&path) {
            Err(SceneError::InvalidAnchor { kind, .. }) => assert_eq!(kind, RegionKind::LeftEye),
            other => panic!("expected invalid anchor, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_sliders_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(
            &path,
            r#"{ "version": "1.0", "image": "a.png", "audio": "a.wav", "size_multiplier": -1.0 }"#,
        )
        .unwrap();
        match LoadedScene::load(&path) {
            Err(SceneError::InvalidSlider { name, value }) => {
                assert_eq!(name, "size_multiplier");
                assert_eq!(value, -1.0);
            }
            other => panic!("expected invalid slider, got {other:?}"),
        }

        std::fs::write(
            &path,
            r#"{ "version": "1.0", "image": "a.png", "audio": "a.wav", "sensitivity": -0.5 }"#,
        )
        .unwrap();
        assert!(matches!(
            LoadedScene::load(&path),
            Err(SceneError::InvalidSlider { name: "sensitivity", .. })
        ));
    }
}
