//! Session context shared between pipeline stages

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::vision::{RecognitionLevel, TextMemory};

/// State owned by one capture session
///
/// Holds the lock-on memory, the in-flight guard for recognition, a pending
/// rescan request and the liveness token. Passed by `Arc` to pipeline stages.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    memory: Mutex<TextMemory>,
    in_flight: AtomicBool,
    rescan_requested: AtomicBool,
    cancel: CancellationToken,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            memory: Mutex::new(TextMemory::new()),
            in_flight: AtomicBool::new(false),
            rescan_requested: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Claim the single recognition slot; `None` while another call is outstanding
    pub fn try_begin(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { session: Arc::clone(self) })
    }

    /// Whether a recognition call is outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Ask for the next processed frame to use accurate recognition
    pub fn request_rescan(&self) {
        self.rescan_requested.store(true, Ordering::Release);
    }

    /// Level for the next recognition call, consuming any pending rescan
    pub fn take_level(&self) -> RecognitionLevel {
        if self.rescan_requested.swap(false, Ordering::AcqRel) {
            RecognitionLevel::Accurate
        } else {
            RecognitionLevel::Fast
        }
    }

    /// Run `f` with exclusive access to the lock-on memory, unless the session
    /// is shut down
    ///
    /// Liveness is checked under the memory lock, and [`Session::shutdown`]
    /// takes the same lock, so no write can land after shutdown.
    pub fn with_live_memory<R>(&self, f: impl FnOnce(&mut TextMemory) -> R) -> Option<R> {
        let mut memory = self.memory.lock();
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(f(&mut memory))
    }

    /// Currently remembered lock-on text
    pub fn remembered_text(&self) -> Option<String> {
        self.memory.lock().remembered().map(str::to_string)
    }

    /// Whether results may still be applied
    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Tear the session down; in-flight results are discarded
    pub fn shutdown(&self) {
        let _memory = self.memory.lock();
        self.cancel.cancel();
    }

    /// Token that resolves once the session is shut down
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Holds the session's recognition slot; releases it on drop
#[derive(Debug)]
pub struct InFlightGuard {
    session: Arc<Session>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_in_flight_slot() {
        let session = Arc::new(Session::new());

        let guard = session.try_begin();
        assert!(guard.is_some());
        assert!(session.is_busy());
        assert!(session.try_begin().is_none());

        drop(guard);
        assert!(!session.is_busy());
        assert!(session.try_begin().is_some());
    }

    #[test]
    fn test_rescan_is_consumed_once() {
        let session = Session::new();
        assert_eq!(session.take_level(), RecognitionLevel::Fast);

        session.request_rescan();
        assert_eq!(session.take_level(), RecognitionLevel::Accurate);
        assert_eq!(session.take_level(), RecognitionLevel::Fast);
    }

    #[test]
    fn test_memory_access() {
        let session = Session::new();
        assert_eq!(session.remembered_text(), None);

        session.with_live_memory(|m| m.remember("LINE"));
        assert_eq!(session.remembered_text(), Some("LINE".to_string()));

        session.with_live_memory(|m| m.clear());
        assert_eq!(session.remembered_text(), None);
    }

    #[test]
    fn test_shutdown_marks_dead() {
        let session = Session::new();
        let token = session.cancellation();
        assert!(session.is_alive());

        session.shutdown();
        assert!(!session.is_alive());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_memory_is_frozen_after_shutdown() {
        let session = Session::new();
        session.with_live_memory(|m| m.remember("KEEP"));

        session.shutdown();
        let written = session.with_live_memory(|m| m.remember("LATE"));
        assert!(written.is_none());
        assert_eq!(session.remembered_text(), Some("KEEP".to_string()));
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        assert_ne!(Session::new().id(), Session::new().id());
    }
}
