//! Error taxonomy for the read-band vision core

use thiserror::Error;

use super::geometry::{Origin, Space};

/// Errors raised while mapping, cropping, annotating or compositing a frame.
///
/// None of these are fatal: the pipeline drops the affected frame and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisionError {
    /// A size with a zero side was supplied
    #[error("invalid dimension {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    /// Dim wash alpha outside [0, 1]
    #[error("dim alpha {0} is outside [0, 1]")]
    InvalidAlpha(f32),

    /// A rectangle reaches past the edge of its container
    #[error("region ({x}, {y}) {width}x{height} exceeds {container_width}x{container_height}")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        container_width: u32,
        container_height: u32,
    },

    /// Two images that must line up have different sizes
    #[error("dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch { expected: (u32, u32), actual: (u32, u32) },

    /// A rectangle was used with the wrong origin convention
    #[error("origin mismatch: expected {expected:?}, got {actual:?}")]
    OriginMismatch { expected: Origin, actual: Origin },

    /// A rectangle was used against the wrong reference frame
    #[error("reference frame mismatch: expected {expected:?}, got {actual:?}")]
    SpaceMismatch { expected: Space, actual: Space },

    /// Normalized box outside the unit square
    #[error("malformed normalized box: {0}")]
    MalformedBox(String),

    /// The recognition gateway produced no usable result
    #[error("recognition unavailable: {0}")]
    RecognitionUnavailable(String),
}

pub type VisionResult<T> = std::result::Result<T, VisionError>;
