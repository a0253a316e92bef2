//! Re-embedding the annotated region into the full frame

use image::{imageops, Pixel, Rgba, RgbaImage};

use super::error::{VisionError, VisionResult};
use super::geometry::{require_origin, require_space, Origin, PixelRect, Size, Space};
use crate::capture::frame::Frame;

/// Place `annotated` at `placement` on a `container`-sized transparent canvas,
/// optionally over a black dim wash of `dim_alpha` opacity.
pub fn reinsert(annotated: &Frame, placement: &PixelRect, container: Size, dim_alpha: f32) -> VisionResult<Frame> {
    if !(0.0..=1.0).contains(&dim_alpha) {
        return Err(VisionError::InvalidAlpha(dim_alpha));
    }
    let container = Size::new(container.width, container.height, container.space)?;
    require_space(placement, Space::Frame)?;
    require_origin(placement, Origin::TopLeft)?;

    let bounds = placement.to_top_left_pixels()?;
    if (bounds.width, bounds.height) != annotated.dimensions() {
        return Err(VisionError::DimensionMismatch {
            expected: (bounds.width, bounds.height),
            actual: annotated.dimensions(),
        });
    }
    if bounds.x < 0
        || bounds.y < 0
        || bounds.x as i64 + bounds.width as i64 > container.width as i64
        || bounds.y as i64 + bounds.height as i64 > container.height as i64
    {
        return Err(VisionError::OutOfBounds {
            x: bounds.x as i64,
            y: bounds.y as i64,
            width: bounds.width,
            height: bounds.height,
            container_width: container.width,
            container_height: container.height,
        });
    }

    let wash_alpha = (dim_alpha * 255.0).round() as u8;
    let mut canvas = RgbaImage::from_pixel(container.width, container.height, Rgba([0, 0, 0, wash_alpha]));
    imageops::replace(&mut canvas, annotated.image(), bounds.x as i64, bounds.y as i64);

    Ok(annotated.with_image(canvas))
}

/// Alpha-composite `foreground` over `base` ("over" operator)
pub fn overlay(base: &Frame, foreground: &Frame) -> VisionResult<Frame> {
    if base.dimensions() != foreground.dimensions() {
        return Err(VisionError::DimensionMismatch {
            expected: base.dimensions(),
            actual: foreground.dimensions(),
        });
    }

    let mut out = base.image().clone();
    for (dst, src) in out.pixels_mut().zip(foreground.image().pixels()) {
        dst.blend(src);
    }

    Ok(base.with_image(out))
}

/// Reinsert the annotated region and composite it over the raw frame
///
/// The wash is blended over the frame; the band itself is copied in unblended,
/// so translucent region pixels come back exactly as extracted.
pub fn compose(base: &Frame, annotated: &Frame, placement: &PixelRect, dim_alpha: f32) -> VisionResult<Frame> {
    let foreground = reinsert(annotated, placement, base.size()?, dim_alpha)?;
    let bounds = placement.to_top_left_pixels()?;

    let mut out = overlay(base, &foreground)?.into_image();
    imageops::replace(&mut out, annotated.image(), bounds.x as i64, bounds.y as i64);

    Ok(base.with_image(out))
}
