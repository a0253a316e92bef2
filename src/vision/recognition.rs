//! Recognition gateway seam
//!
//! The text recognizer is an external service. The pipeline only sees the
//! [`RecognitionGateway`] trait; this module ships a replay gateway driven by a
//! JSON script and a gateway that never finds anything.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use super::error::{VisionError, VisionResult};
use super::Detection;
use crate::capture::frame::Frame;

/// Recognition quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionLevel {
    /// Realtime quality
    #[default]
    Fast,
    /// Slower, higher quality; used for user-triggered rescans
    Accurate,
}

/// Settings passed to the gateway with every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub level: RecognitionLevel,
    /// BCP-47 language tags, in priority order
    pub languages: Vec<String>,
    pub use_language_correction: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            level: RecognitionLevel::Fast,
            languages: vec!["en-US".to_string()],
            use_language_correction: false,
        }
    }
}

impl RecognitionConfig {
    /// Same settings at a different quality level
    pub fn with_level(&self, level: RecognitionLevel) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }
}

/// Asynchronous text recognizer
///
/// Implementations return detections ranked best first. "No text" is an
/// empty vector, not an error.
#[async_trait]
pub trait RecognitionGateway: Send + Sync {
    async fn recognize(&self, image: &Frame, config: &RecognitionConfig) -> VisionResult<Vec<Detection>>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Gateway that never detects any text
#[derive(Debug, Default)]
pub struct NullRecognizer;

#[async_trait]
impl RecognitionGateway for NullRecognizer {
    async fn recognize(&self, _image: &Frame, _config: &RecognitionConfig) -> VisionResult<Vec<Detection>> {
        Ok(vec![])
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Recorded recognizer output, one entry per call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Results for fast calls, replayed in order and cycled
    pub frames: Vec<Vec<Detection>>,
    /// Results for accurate calls; falls back to `frames` when empty
    #[serde(default)]
    pub accurate: Vec<Vec<Detection>>,
}

#[derive(Debug, Default)]
struct ReplayCursor {
    fast: usize,
    accurate: usize,
}

/// Gateway that replays a scripted sequence of results
#[derive(Debug)]
pub struct ReplayRecognizer {
    script: ReplayScript,
    cursor: Mutex<ReplayCursor>,
}

impl ReplayRecognizer {
    /// Build from an in-memory script; malformed boxes are clamped or dropped
    pub fn new(script: ReplayScript) -> Self {
        let script = ReplayScript {
            frames: script.frames.into_iter().map(sanitize_all).collect(),
            accurate: script.accurate.into_iter().map(sanitize_all).collect(),
        };
        Self {
            script,
            cursor: Mutex::new(ReplayCursor::default()),
        }
    }

    /// Load a JSON replay script
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script: {:?}", path))?;
        let script: ReplayScript = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse replay script: {:?}", path))?;

        info!(
            "Loaded replay script with {} fast and {} accurate results",
            script.frames.len(),
            script.accurate.len()
        );
        Ok(Self::new(script))
    }

    fn next(&self, level: RecognitionLevel) -> Option<Vec<Detection>> {
        let mut cursor = self.cursor.lock();
        let (list, index) = match level {
            RecognitionLevel::Accurate if !self.script.accurate.is_empty() => {
                (&self.script.accurate, &mut cursor.accurate)
            }
            _ => (&self.script.frames, &mut cursor.fast),
        };
        if list.is_empty() {
            return None;
        }
        let result = list[*index % list.len()].clone();
        *index += 1;
        Some(result)
    }
}

#[async_trait]
impl RecognitionGateway for ReplayRecognizer {
    async fn recognize(&self, image: &Frame, config: &RecognitionConfig) -> VisionResult<Vec<Detection>> {
        debug!(
            "Replay recognizer: frame {} ({}x{}) at {:?}",
            image.sequence(),
            image.width(),
            image.height(),
            config.level
        );
        self.next(config.level)
            .ok_or_else(|| VisionError::RecognitionUnavailable("replay script is empty".to_string()))
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Clamp slightly-off boxes and drop detections that are malformed
pub(crate) fn sanitize_all(detections: Vec<Detection>) -> Vec<Detection> {
    detections
        .into_iter()
        .filter_map(|d| match d.sanitized() {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Dropping malformed detection: {}", e);
                None
            }
        })
        .collect()
}
