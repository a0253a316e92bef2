//! Message types for communication between the pipeline and the display

use std::sync::atomic::{AtomicU64, Ordering};

use crate::capture::frame::Frame;
use crate::vision::NormalizedBox;

/// Final frame handed to the display, with the text to show beside it
#[derive(Debug, Clone)]
pub struct CompositedFrame {
    /// Full-size frame with the annotated band composited in
    pub frame: Frame,
    /// Top candidate of the selected detection
    pub text: Option<String>,
    /// Where the selected line sits in the full frame (normalized, bottom-left)
    pub location: Option<NormalizedBox>,
    /// Whether this frame came from an accurate rescan
    pub rescan: bool,
}

/// Messages sent from the pipeline to the display thread
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    /// Present a composited frame
    Frame(CompositedFrame),
    /// A frame was dropped because of a processing error
    Skipped { sequence: u64, reason: String },
    /// The pipeline has stopped; the display thread should exit
    Shutdown,
}

/// What happened to a frame offered to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Recognition started for this frame
    Accepted,
    /// Queued behind the in-flight frame
    Queued,
    /// Discarded because recognition was busy or the queue was full
    Dropped,
    /// Discarded because the session is shut down
    Closed,
}

/// Frame counters, safe to update from any stage
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    presented: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub presented: u64,
    pub failed: u64,
    /// Results thrown away after shutdown
    pub discarded: u64,
}

impl PipelineStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presented(&self) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            presented: self.presented.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
