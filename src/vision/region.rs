//! Read region resolution and extraction

use image::imageops;
use serde::{Deserialize, Serialize};

use super::error::{VisionError, VisionResult};
use super::geometry::{require_origin, require_space, Origin, PixelRect, Size, Space};
use crate::capture::frame::Frame;

/// Where the read band sits inside the frame (configuration form)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Left edge in pixels; `None` centers the band horizontally
    pub x: Option<u32>,
    /// Top edge in pixels
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RegionSettings {
    fn default() -> Self {
        // Tuned for a 1080x1920 portrait camera frame
        Self {
            x: None,
            y: 540,
            width: 1080,
            height: 135,
        }
    }
}

impl RegionSettings {
    /// Resolve against the frame size into a fixed read region
    pub fn resolve(&self, frame: Size) -> VisionResult<ReadRegion> {
        let frame = Size::new(frame.width, frame.height, frame.space)?;
        let x = match self.x {
            Some(x) => x as i64,
            None => frame.width as i64 / 2 - self.width as i64 / 2,
        };
        ReadRegion::new(x, self.y as i64, self.width, self.height, frame)
    }
}

/// The fixed, integer-aligned band of the frame that is sent for recognition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadRegion {
    rect: PixelRect,
}

impl ReadRegion {
    /// Build a read region, checking that it fits inside `frame`
    pub fn new(x: i64, y: i64, width: u32, height: u32, frame: Size) -> VisionResult<Self> {
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidDimension { width, height });
        }
        check_contained(x, y, width, height, frame.width, frame.height)?;

        Ok(Self {
            rect: PixelRect::new(
                x as f32,
                y as f32,
                width as f32,
                height as f32,
                Origin::TopLeft,
                Space::Frame,
            ),
        })
    }

    /// The region as a top-left frame-space rectangle
    pub fn rect(&self) -> PixelRect {
        self.rect
    }
}

fn check_contained(x: i64, y: i64, width: u32, height: u32, container_width: u32, container_height: u32) -> VisionResult<()> {
    if x < 0
        || y < 0
        || x + width as i64 > container_width as i64
        || y + height as i64 > container_height as i64
    {
        return Err(VisionError::OutOfBounds {
            x,
            y,
            width,
            height,
            container_width,
            container_height,
        });
    }
    Ok(())
}

/// Crop `region` out of `frame` into a new frame whose origin is the region's corner
pub fn extract(frame: &Frame, region: &PixelRect) -> VisionResult<Frame> {
    require_space(region, Space::Frame)?;
    require_origin(region, Origin::TopLeft)?;

    let bounds = region.to_top_left_pixels()?;
    let (frame_width, frame_height) = frame.dimensions();
    if region.x < 0.0
        || region.y < 0.0
        || region.x + region.width > frame_width as f32
        || region.y + region.height > frame_height as f32
    {
        return Err(VisionError::OutOfBounds {
            x: bounds.x as i64,
            y: bounds.y as i64,
            width: bounds.width,
            height: bounds.height,
            container_width: frame_width,
            container_height: frame_height,
        });
    }
    if bounds.width == 0 || bounds.height == 0 {
        return Err(VisionError::InvalidDimension {
            width: bounds.width,
            height: bounds.height,
        });
    }
    check_contained(
        bounds.x as i64,
        bounds.y as i64,
        bounds.width,
        bounds.height,
        frame.width(),
        frame.height(),
    )?;

    let cropped = imageops::crop_imm(
        frame.image(),
        bounds.x as u32,
        bounds.y as u32,
        bounds.width,
        bounds.height,
    )
    .to_image();

    Ok(frame.with_image(cropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let image = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        Frame::new(image, 1)
    }

    fn frame_rect(x: f32, y: f32, w: f32, h: f32) -> PixelRect {
        PixelRect::new(x, y, w, h, Origin::TopLeft, Space::Frame)
    }

    #[test]
    fn test_extract_dimensions_match_region() {
        let frame = gradient_frame(100, 100);
        let crop = extract(&frame, &frame_rect(10.0, 20.0, 30.0, 15.0)).unwrap();
        assert_eq!(crop.dimensions(), (30, 15));
        // Coordinate space resets to the region corner
        assert_eq!(crop.image().get_pixel(0, 0), &Rgba([10, 20, 0, 255]));
        assert_eq!(crop.image().get_pixel(29, 14), &Rgba([39, 34, 0, 255]));
    }

    #[test]
    fn test_extract_does_not_mutate_source() {
        let frame = gradient_frame(20, 20);
        let before = frame.image().clone();
        let _ = extract(&frame, &frame_rect(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert_eq!(frame.image(), &before);
    }

    #[test]
    fn test_extract_out_of_bounds_right_edge() {
        let frame = gradient_frame(100, 100);
        let result = extract(&frame, &frame_rect(90.0, 0.0, 20.0, 10.0));
        assert!(matches!(result, Err(VisionError::OutOfBounds { .. })));
    }

    #[test]
    fn test_extract_rejects_fractional_overhang() {
        let frame = gradient_frame(100, 100);
        // Ends at 100.2; rounding alone would let it through
        let result = extract(&frame, &frame_rect(90.4, 0.0, 9.8, 10.0));
        assert!(matches!(result, Err(VisionError::OutOfBounds { .. })));

        let result = extract(&frame, &frame_rect(0.0, -0.3, 10.0, 10.0));
        assert!(matches!(result, Err(VisionError::OutOfBounds { .. })));

        // Fractional but inside is fine
        let crop = extract(&frame, &frame_rect(89.6, 0.0, 10.0, 10.0)).unwrap();
        assert_eq!(crop.dimensions(), (10, 10));
    }

    #[test]
    fn test_extract_full_frame_is_allowed() {
        let frame = gradient_frame(16, 8);
        let crop = extract(&frame, &frame_rect(0.0, 0.0, 16.0, 8.0)).unwrap();
        assert_eq!(crop.image(), frame.image());
    }

    #[test]
    fn test_extract_rejects_wrong_conventions() {
        let frame = gradient_frame(10, 10);
        let region_space = PixelRect::new(0.0, 0.0, 5.0, 5.0, Origin::TopLeft, Space::ReadRegion);
        assert!(matches!(extract(&frame, &region_space), Err(VisionError::SpaceMismatch { .. })));

        let bottom_left = PixelRect::new(0.0, 0.0, 5.0, 5.0, Origin::BottomLeft, Space::Frame);
        assert!(matches!(extract(&frame, &bottom_left), Err(VisionError::OriginMismatch { .. })));

        let empty = frame_rect(0.0, 0.0, 0.0, 5.0);
        assert!(matches!(extract(&frame, &empty), Err(VisionError::InvalidDimension { .. })));
    }

    #[test]
    fn test_region_settings_center_horizontally() {
        let frame = Size::new(1080, 1920, Space::Frame).unwrap();
        let settings = RegionSettings { x: None, y: 540, width: 540, height: 120 };
        let region = settings.resolve(frame).unwrap();
        assert_eq!(region.rect(), frame_rect(270.0, 540.0, 540.0, 120.0));
    }

    #[test]
    fn test_region_settings_must_fit() {
        let frame = Size::new(720, 1280, Space::Frame).unwrap();
        let settings = RegionSettings { x: Some(0), y: 1200, width: 720, height: 135 };
        assert!(matches!(settings.resolve(frame), Err(VisionError::OutOfBounds { .. })));

        // Wider than the frame when centered
        let settings = RegionSettings::default();
        assert!(settings.resolve(frame).is_err());
    }
}
