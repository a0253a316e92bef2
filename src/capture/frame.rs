//! Frame data structures for captured video content

use anyhow::{Context, Result};
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::vision::error::{VisionError, VisionResult};
use crate::vision::geometry::{Origin, Size, Space};

/// Channel layout of the raw bytes a source delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    #[default]
    Rgba8,
    /// 32-bit BGRA, the usual camera output layout
    Bgra8,
}

/// Rotation that must be applied to a delivered buffer to make it upright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// Already upright
    #[default]
    Up,
    /// Upside down
    Down,
    /// Needs a quarter turn counter-clockwise
    Left,
    /// Needs a quarter turn clockwise
    Right,
}

/// Per-frame metadata declared by a frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameLayout {
    pub format: PixelFormat,
    pub origin: Origin,
    pub orientation: Orientation,
}

/// A captured frame, normalized to upright top-left RGBA
///
/// Frames are immutable once built; every pipeline stage returns a new one.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
    sequence: u64,
    timestamp: Instant,
}

impl Frame {
    /// Wrap an already-normalized RGBA image
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            timestamp: Instant::now(),
        }
    }

    /// Build a frame from raw source bytes, normalizing layout, origin and orientation
    ///
    /// `bytes_per_row` may exceed `width * 4` when the source pads its rows;
    /// the padding is dropped.
    pub fn from_raw(
        data: Vec<u8>,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        layout: FrameLayout,
        sequence: u64,
    ) -> Result<Self> {
        let row_len = width as usize * 4;
        if bytes_per_row < row_len {
            anyhow::bail!("Row stride {} is shorter than {} pixels", bytes_per_row, width);
        }

        let mut data = if bytes_per_row == row_len || height == 0 {
            data
        } else {
            let needed = bytes_per_row * (height as usize - 1) + row_len;
            if data.len() < needed {
                anyhow::bail!("Buffer too small for {}x{} frame with stride {}", width, height, bytes_per_row);
            }
            data.chunks(bytes_per_row)
                .take(height as usize)
                .flat_map(|row| &row[..row_len])
                .copied()
                .collect()
        };

        if layout.format == PixelFormat::Bgra8 {
            for chunk in data.chunks_exact_mut(4) {
                chunk.swap(0, 2); // Swap B and R
            }
        }

        let image = RgbaImage::from_raw(width, height, data)
            .with_context(|| format!("Buffer too small for {}x{} RGBA frame", width, height))?;

        Ok(Self::new(normalize(image, layout), sequence))
    }

    /// Pixel data
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Consume the frame and return its image
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Timestamp when frame was captured
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Size of the frame measured in `space`
    pub fn size_in(&self, space: Space) -> VisionResult<Size> {
        Size::new(self.width(), self.height(), space)
    }

    /// Size of the frame as a full captured frame
    pub fn size(&self) -> VisionResult<Size> {
        self.size_in(Space::Frame)
    }

    /// Derive a frame with the same sequence number and timestamp but new pixels
    pub fn with_image(&self, image: RgbaImage) -> Self {
        Self {
            image,
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }

    /// Reject frames that cannot be processed at all
    pub fn ensure_non_empty(&self) -> VisionResult<()> {
        if self.width() == 0 || self.height() == 0 {
            return Err(VisionError::InvalidDimension {
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }
}

fn normalize(image: RgbaImage, layout: FrameLayout) -> RgbaImage {
    let image = match layout.origin {
        Origin::TopLeft => image,
        Origin::BottomLeft => imageops::flip_vertical(&image),
    };

    match layout.orientation {
        Orientation::Up => image,
        Orientation::Down => imageops::rotate180(&image),
        Orientation::Left => imageops::rotate270(&image),
        Orientation::Right => imageops::rotate90(&image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_by_one() -> Vec<u8> {
        vec![
            10, 20, 30, 255, // left
            40, 50, 60, 255, // right
        ]
    }

    #[test]
    fn test_bgra_is_swapped_to_rgba() {
        let layout = FrameLayout { format: PixelFormat::Bgra8, ..Default::default() };
        let frame = Frame::from_raw(two_by_one(), 2, 1, 8, layout, 0).unwrap();
        assert_eq!(frame.image().get_pixel(0, 0), &Rgba([30, 20, 10, 255]));
        assert_eq!(frame.image().get_pixel(1, 0), &Rgba([60, 50, 40, 255]));
    }

    #[test]
    fn test_bottom_left_rows_are_flipped() {
        // Row 0 in the buffer is the bottom row of the picture
        let data = vec![
            1, 1, 1, 255, // bottom
            2, 2, 2, 255, // top
        ];
        let layout = FrameLayout { origin: Origin::BottomLeft, ..Default::default() };
        let frame = Frame::from_raw(data, 1, 2, 4, layout, 0).unwrap();
        assert_eq!(frame.image().get_pixel(0, 0)[0], 2);
        assert_eq!(frame.image().get_pixel(0, 1)[0], 1);
    }

    #[test]
    fn test_orientation_rotates_to_upright() {
        let layout = FrameLayout { orientation: Orientation::Right, ..Default::default() };
        let frame = Frame::from_raw(two_by_one(), 2, 1, 8, layout, 0).unwrap();
        assert_eq!(frame.dimensions(), (1, 2));
        // Clockwise quarter turn puts the left pixel on top
        assert_eq!(frame.image().get_pixel(0, 0)[0], 10);

        let layout = FrameLayout { orientation: Orientation::Down, ..Default::default() };
        let frame = Frame::from_raw(two_by_one(), 2, 1, 8, layout, 0).unwrap();
        assert_eq!(frame.image().get_pixel(0, 0)[0], 40);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let result = Frame::from_raw(vec![0; 7], 2, 1, 8, FrameLayout::default(), 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_padded_rows_are_repacked() {
        // 2x2 frame, each row padded to 12 bytes; the last row may omit its padding
        let data = vec![
            1, 0, 0, 255, 2, 0, 0, 255, 99, 99, 99, 99, // row 0
            3, 0, 0, 255, 4, 0, 0, 255, // row 1
        ];
        let frame = Frame::from_raw(data, 2, 2, 12, FrameLayout::default(), 0).unwrap();
        let reds: Vec<u8> = frame.image().pixels().map(|p| p[0]).collect();
        assert_eq!(reds, vec![1, 2, 3, 4]);
        assert!(frame.image().pixels().all(|p| p[3] == 255));

        assert!(Frame::from_raw(vec![0; 16], 2, 2, 6, FrameLayout::default(), 0).is_err());
        assert!(Frame::from_raw(vec![0; 19], 2, 2, 12, FrameLayout::default(), 0).is_err());
    }

    #[test]
    fn test_size_is_tagged() {
        let frame = Frame::new(RgbaImage::new(4, 3), 7);
        let size = frame.size().unwrap();
        assert_eq!((size.width, size.height), (4, 3));
        assert_eq!(size.space, Space::Frame);
        assert_eq!(frame.sequence(), 7);

        let empty = Frame::new(RgbaImage::new(0, 3), 0);
        assert!(empty.ensure_non_empty().is_err());
    }
}
