//! Geometry mapping between normalized boxes and pixel rectangles
//!
//! Recognition results come back as normalized boxes with a bottom-left origin,
//! while image buffers are addressed from the top-left. Every pixel rectangle
//! here carries both its origin convention and the reference frame it lives in,
//! so the two can only be combined through the checked conversions below.

use serde::{Deserialize, Serialize};

use super::error::{VisionError, VisionResult};

/// Slack allowed when clamping gateway boxes that overshoot the unit square
pub const BOX_TOLERANCE: f32 = 1e-3;

/// Vertical origin convention of a rectangle or pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Row 0 is the top edge (image buffers)
    #[default]
    TopLeft,
    /// Row 0 is the bottom edge (recognition boxes, Quartz-style contexts)
    BottomLeft,
}

impl Origin {
    /// The opposite convention
    pub fn flipped(self) -> Self {
        match self {
            Origin::TopLeft => Origin::BottomLeft,
            Origin::BottomLeft => Origin::TopLeft,
        }
    }
}

/// Reference frame a pixel rectangle is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// The full captured frame
    Frame,
    /// The cropped read region
    ReadRegion,
}

/// Image size tagged with the reference frame it describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
    pub space: Space,
}

impl Size {
    /// Create a size, rejecting zero-sized sides
    pub fn new(width: u32, height: u32, space: Space) -> VisionResult<Self> {
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidDimension { width, height });
        }
        Ok(Self { width, height, space })
    }
}

/// Rectangle in [0, 1] coordinates with a bottom-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedBox {
    /// Create a box, rejecting anything that leaves the unit square
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> VisionResult<Self> {
        let candidate = Self { x, y, width, height };
        candidate.validate()?;
        Ok(candidate)
    }

    /// Check the unit-square invariant
    pub fn validate(&self) -> VisionResult<()> {
        let values = [self.x, self.y, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(VisionError::MalformedBox(format!("non-finite value in {:?}", self)));
        }
        if self.x < 0.0 || self.y < 0.0 || self.width < 0.0 || self.height < 0.0 {
            return Err(VisionError::MalformedBox(format!("negative value in {:?}", self)));
        }
        if self.x + self.width > 1.0 + f32::EPSILON || self.y + self.height > 1.0 + f32::EPSILON {
            return Err(VisionError::MalformedBox(format!("{:?} extends past 1.0", self)));
        }
        Ok(())
    }

    /// Clamp a box that overshoots the unit square by at most [`BOX_TOLERANCE`]
    pub fn clamped(&self) -> VisionResult<Self> {
        let lo = -BOX_TOLERANCE;
        let hi = 1.0 + BOX_TOLERANCE;
        let in_slack = |v: f32| v.is_finite() && v >= lo && v <= hi;

        if ![self.x, self.y, self.width, self.height].into_iter().all(in_slack)
            || self.x + self.width > hi
            || self.y + self.height > hi
        {
            return Err(VisionError::MalformedBox(format!("{:?} is outside tolerance", self)));
        }

        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        let width = self.width.clamp(0.0, 1.0 - x);
        let height = self.height.clamp(0.0, 1.0 - y);
        Self::new(x, y, width, height)
    }
}

/// Rectangle in absolute pixels, tagged with origin and reference frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub origin: Origin,
    pub space: Space,
}

/// Integer pixel bounds in a top-left buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32, origin: Origin, space: Space) -> Self {
        Self { x, y, width, height, origin, space }
    }

    /// Express the rectangle in `origin`, flipping against `container_height` if needed
    pub fn to_origin(self, origin: Origin, container_height: u32) -> Self {
        if self.origin == origin {
            self
        } else {
            flip_vertical(self, container_height)
        }
    }

    /// Round to integer bounds for addressing a top-left pixel buffer
    pub fn to_top_left_pixels(&self) -> VisionResult<PixelBounds> {
        if self.origin != Origin::TopLeft {
            return Err(VisionError::OriginMismatch {
                expected: Origin::TopLeft,
                actual: self.origin,
            });
        }
        Ok(PixelBounds {
            x: self.x.round() as i32,
            y: self.y.round() as i32,
            width: self.width.round().max(0.0) as u32,
            height: self.height.round().max(0.0) as u32,
        })
    }

    /// Move a top-left read-region rectangle into full-frame coordinates
    pub fn translate_to_frame(&self, region: &PixelRect) -> VisionResult<Self> {
        require_space(self, Space::ReadRegion)?;
        require_space(region, Space::Frame)?;
        require_origin(self, Origin::TopLeft)?;
        require_origin(region, Origin::TopLeft)?;

        Ok(Self {
            x: self.x + region.x,
            y: self.y + region.y,
            width: self.width,
            height: self.height,
            origin: Origin::TopLeft,
            space: Space::Frame,
        })
    }
}

pub(crate) fn require_space(rect: &PixelRect, expected: Space) -> VisionResult<()> {
    if rect.space != expected {
        return Err(VisionError::SpaceMismatch { expected, actual: rect.space });
    }
    Ok(())
}

pub(crate) fn require_origin(rect: &PixelRect, expected: Origin) -> VisionResult<()> {
    if rect.origin != expected {
        return Err(VisionError::OriginMismatch { expected, actual: rect.origin });
    }
    Ok(())
}

/// Expand a normalized box to pixels of `target`; the result keeps the
/// bottom-left origin of the box.
pub fn unfold(normalized: &NormalizedBox, target: Size) -> VisionResult<PixelRect> {
    let target = Size::new(target.width, target.height, target.space)?;
    let w = target.width as f32;
    let h = target.height as f32;

    Ok(PixelRect {
        x: normalized.x * w,
        y: normalized.y * h,
        width: normalized.width * w,
        height: normalized.height * h,
        origin: Origin::BottomLeft,
        space: target.space,
    })
}

/// Inverse of [`unfold`]
pub fn fold(rect: &PixelRect, target: Size) -> VisionResult<NormalizedBox> {
    let target = Size::new(target.width, target.height, target.space)?;
    require_space(rect, target.space)?;

    let rect = rect.to_origin(Origin::BottomLeft, target.height);
    let w = target.width as f32;
    let h = target.height as f32;

    Ok(NormalizedBox {
        x: rect.x / w,
        y: rect.y / h,
        width: rect.width / w,
        height: rect.height / h,
    })
}

/// Switch a rectangle between bottom-left and top-left origin
pub fn flip_vertical(rect: PixelRect, container_height: u32) -> PixelRect {
    PixelRect {
        y: container_height as f32 - rect.y - rect.height,
        origin: rect.origin.flipped(),
        ..rect
    }
}
