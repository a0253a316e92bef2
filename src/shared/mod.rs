//! Shared session state and messaging
//!
//! This module provides the per-session context passed to pipeline stages
//! and the messages exchanged between the pipeline and the display thread.

pub mod messages;
pub mod state;

pub use messages::{CompositedFrame, DisplayEvent, PipelineStats, StatsSnapshot, SubmitOutcome};
pub use state::{InFlightGuard, Session};
