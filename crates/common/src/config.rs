//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where exported videos are written.
    pub output_dir: PathBuf,

    /// Default animation sliders.
    pub animation: AnimationDefaults,

    /// Rendering surface and tick rate.
    pub surface: SurfaceDefaults,

    /// Export/encoder settings.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default values for the two user sliders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationDefaults {
    /// Mouth sensitivity multiplier applied to the audio envelope.
    pub sensitivity: f64,

    /// Mouth size multiplier applied to resolved mouth radii.
    pub size_multiplier: f64,
}

/// Rendering surface dimensions and frame rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceDefaults {
    pub width: u32,
    pub height: u32,
    /// Output ticks per second.
    pub fps: u32,
}

/// Encoder defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Container/codec name: "mp4" or "webm".
    pub format: String,

    pub video_bitrate_kbps: u32,

    pub audio_bitrate_kbps: u32,

    /// How many times the finished output is probed before giving up.
    pub finalize_attempts: u32,

    /// Delay between output probes.
    pub retry_delay_ms: u64,

    /// Output at or below this size is treated as not yet written.
    pub min_readable_bytes: u64,

    /// Final output below this size is reported as truncated.
    pub min_plausible_bytes: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "talkpic=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            animation: AnimationDefaults::default(),
            surface: SurfaceDefaults::default(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AnimationDefaults {
    fn default() -> Self {
        Self {
            sensitivity: 1.5,
            size_multiplier: 1.0,
        }
    }
}

impl Default for SurfaceDefaults {
    fn default() -> Self {
        Self {
            width: 720,
            height: 720,
            fps: 24,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            format: "mp4".to_string(),
            video_bitrate_kbps: 2500,
            audio_bitrate_kbps: 128,
            finalize_attempts: 3,
            retry_delay_ms: 1000,
            min_readable_bytes: 1024,
            min_plausible_bytes: 10 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Plain stderr logging at `debug` or `info`.
    pub fn for_verbosity(verbose: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "info" }.to_string(),
            ..Self::default()
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("talkpic").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_sliders() {
        let config = AppConfig::default();
        assert!((config.animation.sensitivity - 1.5).abs() < 1e-9);
        assert!((config.animation.size_multiplier - 1.0).abs() < 1e-9);
        assert_eq!(config.surface.fps, 24);
        assert_eq!(config.export.finalize_attempts, 3);
        assert_eq!(config.export.min_plausible_bytes, 10240);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "animation": { "sensitivity": 2.0 }, "surface": { "fps": 30 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!((config.animation.sensitivity - 2.0).abs() < 1e-9);
        assert!((config.animation.size_multiplier - 1.0).abs() < 1e-9);
        assert_eq!(config.surface.fps, 30);
        assert_eq!(config.surface.width, 720);
        assert_eq!(config.export.format, "mp4");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.export.format = "webm".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.format, "webm");
    }

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.surface.width, 720);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LoggingConfig::for_verbosity(true).level, "debug");
        assert_eq!(LoggingConfig::for_verbosity(false).level, "info");
    }
}
