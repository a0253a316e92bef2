//! Frame Capture Layer
//!
//! Frame sources deliver raw frames with a declared pixel format, row origin
//! and orientation. Everything is normalized into [`Frame`] on the way in.
//! Camera device management lives outside this crate; the sources here read
//! still images from disk.

pub mod frame;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use frame::{Frame, FrameLayout, Orientation, PixelFormat};

/// Producer of frames for the pipeline
pub trait FrameSource: Send {
    /// Next frame, `None` once the source is exhausted
    fn next_frame(&mut self) -> Option<Result<Frame>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Image file extensions picked up by [`ImageDirSource`]
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Decode an image file and declare its bytes with `layout`
fn load_frame(path: &Path, layout: FrameLayout, sequence: u64) -> Result<Frame> {
    let decoded = image::open(path)
        .with_context(|| format!("Failed to load frame image: {:?}", path))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Frame::from_raw(decoded.into_raw(), width, height, width as usize * 4, layout, sequence)
}

/// Plays back every image in a directory, in file name order
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    layout: FrameLayout,
}

impl ImageDirSource {
    pub fn new(dir: &Path, layout: FrameLayout) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory: {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        info!("Found {} frame images in {:?}", files.len(), dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            position: 0,
            layout,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Option<Result<Frame>> {
        let path = self.files.get(self.position)?;
        let sequence = self.position as u64;
        self.position += 1;
        debug!("Loading frame {} from {:?}", sequence, path);
        Some(load_frame(path, self.layout, sequence))
    }

    fn describe(&self) -> String {
        format!("directory {:?} ({} frames)", self.dir, self.files.len())
    }
}

/// Repeats a single still image a fixed number of times
pub struct RepeatSource {
    path: PathBuf,
    frame: Frame,
    count: u64,
    delivered: u64,
}

impl RepeatSource {
    pub fn new(path: &Path, layout: FrameLayout, count: u64) -> Result<Self> {
        let frame = load_frame(path, layout, 0)?;
        Ok(Self::from_frame(path, frame, count))
    }

    /// Repeat an in-memory frame
    pub fn from_frame(path: &Path, frame: Frame, count: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            frame,
            count,
            delivered: 0,
        }
    }
}

impl FrameSource for RepeatSource {
    fn next_frame(&mut self) -> Option<Result<Frame>> {
        if self.delivered >= self.count {
            return None;
        }
        let sequence = self.delivered;
        self.delivered += 1;
        Some(Ok(Frame::new(self.frame.image().clone(), sequence)))
    }

    fn describe(&self) -> String {
        format!("{:?} repeated {} times", self.path, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Origin;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, value: u8) {
        let image = RgbaImage::from_pixel(4, 2, Rgba([value, 0, 0, 255]));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_image_dir_source_sorted_order() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "b.png", 2);
        write_png(dir.path(), "a.png", 1);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::new(dir.path(), FrameLayout::default()).unwrap();
        assert!(source.describe().contains("2 frames"));

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.sequence(), 0);
        assert_eq!(first.image().get_pixel(0, 0)[0], 1);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.sequence(), 1);
        assert_eq!(second.image().get_pixel(0, 0)[0], 2);

        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_image_dir_source_applies_layout() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "frame.png", 9);

        let layout = FrameLayout {
            format: PixelFormat::Bgra8,
            origin: Origin::BottomLeft,
            orientation: Orientation::Right,
        };
        let mut source = ImageDirSource::new(dir.path(), layout).unwrap();
        let frame = source.next_frame().unwrap().unwrap();

        assert_eq!(frame.dimensions(), (2, 4));
        assert_eq!(frame.image().get_pixel(0, 0), &Rgba([0, 0, 9, 255]));
    }

    #[test]
    fn test_image_dir_source_missing_dir() {
        assert!(ImageDirSource::new(Path::new("/nonexistent/frames"), FrameLayout::default()).is_err());
    }

    #[test]
    fn test_repeat_source_count() {
        let frame = Frame::new(RgbaImage::new(2, 2), 0);
        let mut source = RepeatSource::from_frame(Path::new("still.png"), frame, 3);

        let sequences: Vec<u64> = std::iter::from_fn(|| source.next_frame())
            .map(|f| f.unwrap().sequence())
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }
}
