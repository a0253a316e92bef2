//! Display Presentation Layer
//!
//! Composited frames are presented from a single dedicated display thread.
//! Pipeline stages never touch a sink directly; they send [`DisplayEvent`]s
//! over a channel and the display thread drains it in order.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::shared::{CompositedFrame, DisplayEvent};

/// Destination for composited frames
pub trait DisplaySink: Send {
    /// Present one frame; failures are logged, not returned
    fn present(&mut self, frame: &CompositedFrame);

    /// Called for frames that could not be processed
    fn skipped(&mut self, sequence: u64, reason: &str) {
        debug!("Frame {} skipped: {}", sequence, reason);
    }
}

/// Writes each composited frame as a numbered PNG file
pub struct PngSequenceSink {
    dir: PathBuf,
}

impl PngSequenceSink {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    /// Path a frame with `sequence` is written to
    pub fn frame_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", sequence))
    }
}

impl DisplaySink for PngSequenceSink {
    fn present(&mut self, frame: &CompositedFrame) {
        let path = self.frame_path(frame.frame.sequence());
        if let Err(e) = frame.frame.image().save(&path) {
            error!("Failed to write {:?}: {}", path, e);
            return;
        }
        info!(
            "Frame {} -> {:?} text={:?}{}",
            frame.frame.sequence(),
            path,
            frame.text,
            if frame.rescan { " (rescan)" } else { "" }
        );
    }
}

/// Only reports the recognized text
#[derive(Debug, Default)]
pub struct LogSink;

impl DisplaySink for LogSink {
    fn present(&mut self, frame: &CompositedFrame) {
        match &frame.text {
            Some(text) => info!(
                "Frame {}: {} at {:?}{}",
                frame.frame.sequence(),
                text,
                frame.location,
                if frame.rescan { " (rescan)" } else { "" }
            ),
            None => info!("Frame {}: no text", frame.frame.sequence()),
        }
    }
}

/// Summary returned when the display thread exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayReport {
    pub presented: u64,
    pub skipped: u64,
    /// Text shown with the last presented frame
    pub last_text: Option<String>,
}

/// The single thread allowed to present frames
pub struct DisplayThread {
    sender: Sender<DisplayEvent>,
    handle: Option<JoinHandle<DisplayReport>>,
}

impl DisplayThread {
    /// Start the display thread around `sink`
    pub fn spawn<S: DisplaySink + 'static>(sink: S) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let handle = std::thread::Builder::new()
            .name("display".to_string())
            .spawn(move || run_display(sink, receiver))
            .context("Failed to spawn display thread")?;

        info!("Display thread started");
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Get a sender for posting events from other threads
    pub fn sender(&self) -> Sender<DisplayEvent> {
        self.sender.clone()
    }

    /// Stop the thread after it drains pending events
    pub fn join(mut self) -> DisplayReport {
        self.stop()
    }

    fn stop(&mut self) -> DisplayReport {
        let _ = self.sender.send(DisplayEvent::Shutdown);
        match self.handle.take().map(|h| h.join()) {
            Some(Ok(report)) => report,
            Some(Err(_)) => {
                error!("Display thread panicked");
                DisplayReport::default()
            }
            None => DisplayReport::default(),
        }
    }
}

impl Drop for DisplayThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run_display<S: DisplaySink>(mut sink: S, receiver: Receiver<DisplayEvent>) -> DisplayReport {
    let mut report = DisplayReport::default();

    while let Ok(event) = receiver.recv() {
        match event {
            DisplayEvent::Frame(frame) => {
                sink.present(&frame);
                report.presented += 1;
                report.last_text = frame.text.clone();
            }
            DisplayEvent::Skipped { sequence, reason } => {
                sink.skipped(sequence, &reason);
                report.skipped += 1;
            }
            DisplayEvent::Shutdown => break,
        }
    }

    if report.presented == 0 {
        warn!("Display thread exiting without presenting any frame");
    }
    info!("Display thread exiting...");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Frame;
    use image::RgbaImage;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<(u64, Option<String>, String)>>>,
    }

    impl DisplaySink for RecordingSink {
        fn present(&mut self, frame: &CompositedFrame) {
            let thread = std::thread::current().name().unwrap_or_default().to_string();
            self.seen.lock().push((frame.frame.sequence(), frame.text.clone(), thread));
        }
    }

    fn composited(sequence: u64, text: Option<&str>) -> CompositedFrame {
        CompositedFrame {
            frame: Frame::new(RgbaImage::new(4, 4), sequence),
            text: text.map(str::to_string),
            location: None,
            rescan: false,
        }
    }

    #[test]
    fn test_display_thread_presents_in_order() {
        let sink = RecordingSink::default();
        let seen = sink.seen.clone();
        let display = DisplayThread::spawn(sink).unwrap();
        let sender = display.sender();

        sender.send(DisplayEvent::Frame(composited(1, Some("A")))).unwrap();
        sender.send(DisplayEvent::Skipped { sequence: 2, reason: "boom".into() }).unwrap();
        sender.send(DisplayEvent::Frame(composited(3, None))).unwrap();

        let report = display.join();
        assert_eq!(report.presented, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.last_text, None);

        let seen = seen.lock();
        assert_eq!(seen.iter().map(|s| s.0).collect::<Vec<_>>(), vec![1, 3]);
        assert!(seen.iter().all(|s| s.2 == "display"));
    }

    #[test]
    fn test_png_sink_writes_numbered_files() {
        let dir = TempDir::new().unwrap();
        let mut sink = PngSequenceSink::new(&dir.path().join("out")).unwrap();

        sink.present(&composited(42, Some("HELLO")));

        let path = dir.path().join("out").join("frame_000042.png");
        assert!(path.exists());
        let loaded = image::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 4));
    }
}
