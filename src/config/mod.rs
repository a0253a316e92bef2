//! Application Configuration
//!
//! Pipeline, recognition, capture and display settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::{Orientation, PixelFormat};
use crate::vision::{MarkerPolicy, Origin, RecognitionConfig, RegionSettings};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Read band and annotation settings
    pub pipeline: PipelineSettings,
    /// Settings forwarded to the recognition gateway
    pub recognition: RecognitionConfig,
    /// Frame source settings
    pub capture: CaptureSettings,
    /// Display sink settings
    pub display: DisplaySettings,
}

/// Read band and annotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Band of the frame sent for recognition
    pub read_region: RegionSettings,
    /// Opacity of the black wash outside the read band (0.0 - 1.0)
    pub dim_alpha: f32,
    /// Which detections get a marker
    pub marker_policy: MarkerPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            read_region: RegionSettings::default(),
            dim_alpha: 0.8,
            marker_policy: MarkerPolicy::default(),
        }
    }
}

/// What to do with frames that arrive while recognition is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Backpressure {
    /// Discard frames that arrive late
    #[default]
    DropLate,
    /// Queue up to `depth` frames and process them in order
    Queue { depth: usize },
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Maximum frames per second pulled from the source
    pub max_fps: u32,
    pub backpressure: Backpressure,
    /// Channel layout the source delivers
    pub pixel_format: PixelFormat,
    /// Row origin the source delivers
    pub origin: Origin,
    /// Rotation needed to make source frames upright
    pub orientation: Orientation,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_fps: 30,
            backpressure: Backpressure::DropLate,
            pixel_format: PixelFormat::Rgba8,
            origin: Origin::TopLeft,
            orientation: Orientation::Up,
        }
    }
}

/// Display sink settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Directory for composited frames; `None` only logs recognized text
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Check values serde cannot express
    pub fn validate(&self) -> Result<()> {
        let alpha = self.pipeline.dim_alpha;
        if !(0.0..=1.0).contains(&alpha) {
            anyhow::bail!("pipeline.dim_alpha must be within [0, 1], got {}", alpha);
        }
        if self.capture.max_fps == 0 {
            anyhow::bail!("capture.max_fps must be positive");
        }
        if let Backpressure::Queue { depth: 0 } = self.capture.backpressure {
            anyhow::bail!("capture.backpressure.depth must be positive");
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::RecognitionLevel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Check pipeline defaults
        assert_eq!(config.pipeline.read_region.x, None);
        assert_eq!(config.pipeline.read_region.y, 540);
        assert_eq!(config.pipeline.read_region.width, 1080);
        assert_eq!(config.pipeline.read_region.height, 135);
        assert!((config.pipeline.dim_alpha - 0.8).abs() < 0.01);
        assert_eq!(config.pipeline.marker_policy, MarkerPolicy::MatchPrevious);

        // Check recognition defaults
        assert_eq!(config.recognition.level, RecognitionLevel::Fast);
        assert!(!config.recognition.use_language_correction);

        // Check capture defaults
        assert_eq!(config.capture.max_fps, 30);
        assert_eq!(config.capture.backpressure, Backpressure::DropLate);
        assert_eq!(config.capture.origin, Origin::TopLeft);

        assert!(config.display.output_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.pipeline.read_region.x = Some(12);
        config.pipeline.marker_policy = MarkerPolicy::All;
        config.capture.backpressure = Backpressure::Queue { depth: 3 };
        config.capture.pixel_format = PixelFormat::Bgra8;
        config.display.output_dir = Some(PathBuf::from("/tmp/frames"));

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.pipeline.read_region, config.pipeline.read_region);
        assert_eq!(parsed.pipeline.marker_policy, MarkerPolicy::All);
        assert_eq!(parsed.capture.backpressure, Backpressure::Queue { depth: 3 });
        assert_eq!(parsed.capture.pixel_format, PixelFormat::Bgra8);
        assert_eq!(parsed.display.output_dir, config.display.output_dir);
        assert_eq!(parsed.recognition, config.recognition);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [pipeline]
            dim_alpha = 0.92
            marker_policy = "first-only"

            [recognition]
            level = "accurate"
            languages = ["ja-JP", "en-US"]
            use_language_correction = true
            "#,
        )
        .unwrap();

        assert!((parsed.pipeline.dim_alpha - 0.92).abs() < 0.001);
        assert_eq!(parsed.pipeline.marker_policy, MarkerPolicy::FirstOnly);
        assert_eq!(parsed.pipeline.read_region, RegionSettings::default());
        assert_eq!(parsed.recognition.level, RecognitionLevel::Accurate);
        assert_eq!(parsed.recognition.languages.len(), 2);
        assert_eq!(parsed.capture.max_fps, 30);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.capture.max_fps, loaded.capture.max_fps);
        assert_eq!(config.pipeline.read_region, loaded.pipeline.read_region);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_rejects_bad_alpha() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[pipeline]\ndim_alpha = 1.5").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
