//! Pipeline Coordinator
//!
//! Drives frames from a source through extraction, asynchronous recognition,
//! annotation and compositing, and posts the results to the display thread.
//! At most one recognition call is outstanding per session.

use anyhow::Result;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::capture::{Frame, FrameSource};
use crate::config::{AppConfig, Backpressure, PipelineSettings};
use crate::shared::{CompositedFrame, DisplayEvent, InFlightGuard, PipelineStats, Session, StatsSnapshot, SubmitOutcome};
use crate::vision::recognition::sanitize_all;
use crate::vision::{
    compose, extract, fold, Annotator, ReadRegion, RecognitionConfig, RecognitionGateway, RecognitionLevel,
    VisionError, VisionResult,
};

/// A frame waiting for recognition
struct Job {
    frame: Frame,
    /// Recognize this frame with the accurate level
    rescan: bool,
}

/// Per-frame work shared by every processing task
struct FrameProcessor {
    session: Arc<Session>,
    gateway: Arc<dyn RecognitionGateway>,
    display: Sender<DisplayEvent>,
    settings: PipelineSettings,
    recognition: RecognitionConfig,
    annotator: Annotator,
    region: OnceLock<ReadRegion>,
    stats: Arc<PipelineStats>,
}

impl FrameProcessor {
    /// Process one frame while holding the session's recognition slot
    async fn process(&self, job: Job, _guard: InFlightGuard) {
        let sequence = job.frame.sequence();

        match self.run(job).await {
            Ok(Some(composited)) => {
                debug!("Frame {} ready after {:?}", sequence, composited.frame.timestamp().elapsed());
                if self.session.is_alive() && self.display.send(DisplayEvent::Frame(composited)).is_ok() {
                    self.stats.record_presented();
                } else {
                    self.stats.record_discarded();
                }
            }
            Ok(None) => {
                debug!("Discarding result for frame {} after shutdown", sequence);
                self.stats.record_discarded();
            }
            Err(e) => {
                warn!("Frame {} skipped: {}", sequence, e);
                self.stats.record_failed();
                let _ = self.display.send(DisplayEvent::Skipped {
                    sequence,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn run(&self, job: Job) -> VisionResult<Option<CompositedFrame>> {
        let Job { frame, rescan } = job;
        frame.ensure_non_empty()?;
        let region = self.read_region(&frame)?;
        let crop = extract(&frame, &region.rect())?;

        let requested = self.session.take_level();
        let level = if rescan { RecognitionLevel::Accurate } else { requested };
        let config = self.recognition.with_level(level);
        let detections = match self.gateway.recognize(&crop, &config).await {
            Ok(detections) => sanitize_all(detections),
            Err(e) => {
                let reason = match e {
                    VisionError::RecognitionUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                warn!(
                    "{}; treating frame {} as empty",
                    VisionError::RecognitionUnavailable(reason),
                    frame.sequence()
                );
                vec![]
            }
        };

        let policy = self.settings.marker_policy;
        let annotated = self
            .session
            .with_live_memory(|memory| self.annotator.annotate(&crop, &detections, policy, memory));
        let Some(annotation) = annotated.transpose()? else {
            return Ok(None);
        };
        let composited = compose(&frame, &annotation.frame, &region.rect(), self.settings.dim_alpha)?;

        let location = match annotation.markers.first() {
            Some(marker) => Some(fold(&marker.translate_to_frame(&region.rect())?, frame.size()?)?),
            None => None,
        };

        let rescan = level == RecognitionLevel::Accurate;
        if rescan {
            info!("Accurate rescan read {:?}; releasing lock-on", annotation.text);
            if self.session.with_live_memory(|memory| memory.clear()).is_none() {
                return Ok(None);
            }
        }

        debug!(
            "Frame {}: {} detections, selected {:?}, lock-on {:?}",
            frame.sequence(),
            detections.len(),
            annotation.selected,
            self.session.remembered_text()
        );

        Ok(Some(CompositedFrame {
            frame: composited,
            text: annotation.text,
            location,
            rescan,
        }))
    }

    /// Resolve the read region from the first processable frame, then reuse it
    fn read_region(&self, frame: &Frame) -> VisionResult<ReadRegion> {
        if let Some(region) = self.region.get() {
            return Ok(*region);
        }
        let region = self.settings.read_region.resolve(frame.size()?)?;
        let region = *self.region.get_or_init(|| region);
        info!("Read region fixed at {:?}", region.rect());
        Ok(region)
    }
}

enum Mode {
    DropLate {
        tasks: Mutex<JoinSet<()>>,
    },
    Queue {
        sender: mpsc::Sender<Job>,
        worker: JoinHandle<()>,
    },
}

/// Real-time read-band pipeline
///
/// Must be created inside a tokio runtime.
pub struct ReadPipeline {
    processor: Arc<FrameProcessor>,
    mode: Mode,
}

impl ReadPipeline {
    pub fn new(config: &AppConfig, gateway: Arc<dyn RecognitionGateway>, display: Sender<DisplayEvent>) -> Result<Self> {
        config.validate()?;

        let session = Arc::new(Session::new());
        info!(
            "Session {} using '{}' recognizer, policy {:?}",
            session.id(),
            gateway.name(),
            config.pipeline.marker_policy
        );

        let processor = Arc::new(FrameProcessor {
            session,
            gateway,
            display,
            settings: config.pipeline.clone(),
            recognition: config.recognition.clone(),
            annotator: Annotator::new(),
            region: OnceLock::new(),
            stats: Arc::new(PipelineStats::default()),
        });

        let mode = match config.capture.backpressure {
            Backpressure::DropLate => Mode::DropLate {
                tasks: Mutex::new(JoinSet::new()),
            },
            Backpressure::Queue { depth } => {
                let (sender, receiver) = mpsc::channel(depth);
                let worker = tokio::spawn(queue_worker(processor.clone(), receiver));
                Mode::Queue { sender, worker }
            }
        };

        Ok(Self { processor, mode })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.processor.session
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.processor.stats.snapshot()
    }

    /// Offer a frame to the pipeline
    pub fn submit(&self, frame: Frame) -> SubmitOutcome {
        self.enqueue(Job { frame, rescan: false })
    }

    /// Offer a frame to be recognized with the accurate level
    ///
    /// If the frame is dropped, the rescan carries over to the next frame
    /// that gets processed.
    pub fn submit_rescan(&self, frame: Frame) -> SubmitOutcome {
        self.enqueue(Job { frame, rescan: true })
    }

    fn enqueue(&self, job: Job) -> SubmitOutcome {
        let processor = &self.processor;
        if !processor.session.is_alive() {
            return SubmitOutcome::Closed;
        }
        processor.stats.record_submitted();
        let sequence = job.frame.sequence();
        let rescan = job.rescan;

        let outcome = match &self.mode {
            Mode::DropLate { tasks } => {
                let Some(guard) = processor.session.try_begin() else {
                    debug!("Recognition busy, dropping frame {}", sequence);
                    processor.stats.record_dropped();
                    return self.carry_rescan(rescan, SubmitOutcome::Dropped);
                };

                let task = processor.clone();
                let span = info_span!("frame", session = %processor.session.id(), sequence);
                let mut tasks = tasks.lock();
                while tasks.try_join_next().is_some() {}
                tasks.spawn(async move { task.process(job, guard).await }.instrument(span));
                SubmitOutcome::Accepted
            }
            Mode::Queue { sender, .. } => match sender.try_send(job) {
                Ok(()) => SubmitOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Queue full, dropping frame {}", sequence);
                    processor.stats.record_dropped();
                    SubmitOutcome::Dropped
                }
                Err(mpsc::error::TrySendError::Closed(_)) => SubmitOutcome::Closed,
            },
        };
        self.carry_rescan(rescan, outcome)
    }

    fn carry_rescan(&self, rescan: bool, outcome: SubmitOutcome) -> SubmitOutcome {
        if rescan && outcome == SubmitOutcome::Dropped {
            debug!("Rescan frame dropped; next processed frame rescans instead");
            self.processor.session.request_rescan();
        }
        outcome
    }

    /// Tear down the session; results still in flight are discarded
    pub fn shutdown(&self) {
        info!("Shutting down session {}", self.processor.session.id());
        self.processor.session.shutdown();
    }

    /// Wait for outstanding work to complete and return the final counters
    pub async fn finish(self) -> StatsSnapshot {
        if self.processor.session.is_busy() {
            debug!("Waiting for in-flight recognition");
        }
        match self.mode {
            Mode::DropLate { tasks } => {
                let mut tasks = tasks.into_inner();
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        warn!("Frame task failed: {}", e);
                    }
                }
            }
            Mode::Queue { sender, worker } => {
                drop(sender);
                if let Err(e) = worker.await {
                    warn!("Queue worker failed: {}", e);
                }
            }
        }
        self.processor.stats.snapshot()
    }
}

async fn queue_worker(processor: Arc<FrameProcessor>, mut receiver: mpsc::Receiver<Job>) {
    while let Some(job) = receiver.recv().await {
        if !processor.session.is_alive() {
            processor.stats.record_discarded();
            continue;
        }
        let sequence = job.frame.sequence();
        match processor.session.try_begin() {
            Some(guard) => {
                let span = info_span!("frame", session = %processor.session.id(), sequence);
                processor.process(job, guard).instrument(span).await;
            }
            None => {
                warn!("Recognition slot taken, dropping queued frame {}", sequence);
                processor.stats.record_dropped();
            }
        }
    }
    debug!("Queue worker exiting");
}

/// Pull frames from `source` at up to `max_fps` and submit them until the
/// source runs dry or the session is shut down.
pub async fn run_source(
    pipeline: &ReadPipeline,
    source: &mut dyn FrameSource,
    max_fps: u32,
    rescan_at: &[u64],
) -> Result<()> {
    info!("Reading frames from {}", source.describe());

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / max_fps.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let cancelled = pipeline.session().cancellation();

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => {
                info!("Session cancelled, stopping frame loop");
                break;
            }
            _ = ticker.tick() => {}
        }

        let Some(next) = source.next_frame() else {
            info!("Frame source exhausted");
            break;
        };

        match next {
            Ok(frame) => {
                let outcome = if rescan_at.contains(&frame.sequence()) {
                    info!("Accurate rescan requested at frame {}", frame.sequence());
                    pipeline.submit_rescan(frame)
                } else {
                    pipeline.submit(frame)
                };
                debug!("Submit outcome: {:?}", outcome);
            }
            Err(e) => warn!("Failed to read frame: {:#}", e),
        }
    }

    let stats = pipeline.stats();
    info!(
        "Frame loop finished: {} submitted, {} dropped so far",
        stats.submitted, stats.dropped
    );
    Ok(())
}
