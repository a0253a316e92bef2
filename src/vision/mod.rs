//! Vision Layer
//!
//! Turns a full frame plus recognition results into an annotated frame:
//! geometry mapping, read-region extraction, marker drawing and compositing.
//! Text recognition itself sits behind the [`RecognitionGateway`] trait.

pub mod annotate;
pub mod composite;
pub mod error;
pub mod geometry;
pub mod recognition;
pub mod region;

use serde::{Deserialize, Serialize};

pub use annotate::{Annotator, MarkerPolicy, TextMemory};
pub use composite::compose;
pub use error::{VisionError, VisionResult};
pub use geometry::{fold, NormalizedBox, Origin};
pub use recognition::{NullRecognizer, RecognitionConfig, RecognitionGateway, RecognitionLevel, ReplayRecognizer};
pub use region::{extract, ReadRegion, RegionSettings};

/// One candidate string for a detected text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Recognized text
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

#[cfg(test)]
impl Candidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A detected text region with its ranked candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box, normalized with a bottom-left origin
    pub bounding_box: NormalizedBox,
    /// Candidates ordered by descending confidence
    pub candidates: Vec<Candidate>,
}

impl Detection {
    /// Create a detection; candidates are sorted best first
    pub fn new(bounding_box: NormalizedBox, mut candidates: Vec<Candidate>) -> Self {
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self {
            bounding_box,
            candidates,
        }
    }

    /// Text of the best candidate
    pub fn top_text(&self) -> Option<&str> {
        self.candidates.first().map(|c| c.text.as_str())
    }

    /// Re-sort candidates and clamp the box, rejecting detections that are too far off
    pub fn sanitized(self) -> VisionResult<Self> {
        let bounding_box = self.bounding_box.clamped()?;
        Ok(Self::new(bounding_box, self.candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_sorted_by_confidence() {
        let detection = Detection::new(
            NormalizedBox::new(0.0, 0.0, 0.5, 0.5).unwrap(),
            vec![
                Candidate::new("low", 0.2),
                Candidate::new("high", 0.95),
                Candidate::new("mid", 0.5),
            ],
        );
        assert_eq!(detection.top_text(), Some("high"));
        assert_eq!(detection.candidates[2].text, "low");
    }

    #[test]
    fn test_detection_without_candidates() {
        let detection = Detection::new(NormalizedBox::new(0.0, 0.0, 0.1, 0.1).unwrap(), vec![]);
        assert_eq!(detection.top_text(), None);
    }

    #[test]
    fn test_sanitized_rejects_malformed_box() {
        let detection = Detection {
            bounding_box: NormalizedBox { x: 0.8, y: 0.0, width: 0.5, height: 0.1 },
            candidates: vec![Candidate::new("x", 1.0)],
        };
        assert!(matches!(detection.sanitized(), Err(VisionError::MalformedBox(_))));
    }
}
