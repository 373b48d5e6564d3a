//! In-memory recorder backend
//!
//! A recorder that emits whatever bytes the caller feeds it. Completion
//! signaling, stop failures and start failures are scriptable so the
//! session's timing and recovery paths can run without a device.

use super::handle::{
    HandleEvent, HandleEventSender, HandleState, RecorderFactory, RecorderHandle,
};
use crate::capture::Source;
use crate::config::RecorderOptions;
use crate::utils::error::HandleError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted behavior for recorders built by a [`SimulatedRecorderFactory`]
#[derive(Debug, Clone)]
pub struct SimulatedBehavior {
    /// Emit `Stopped` when stopped; a silent recorder never completes
    pub signals_stop: bool,
    /// Fail every `stop` call
    pub fail_stop: bool,
    /// Fail every `request_flush` call
    pub fail_flush: bool,
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self {
            signals_stop: true,
            fail_stop: false,
            fail_flush: false,
        }
    }
}

/// Recorder driven entirely by the caller
pub struct SimulatedRecorder {
    state: Mutex<HandleState>,
    events: HandleEventSender,
    pending: Mutex<Vec<u8>>,
    behavior: SimulatedBehavior,
    timeslice: Mutex<Option<Duration>>,
    source_id: uuid::Uuid,
    mime_type: String,
    flush_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl SimulatedRecorder {
    pub fn new(source: &Source, mime_type: &str, events: HandleEventSender, behavior: SimulatedBehavior) -> Self {
        Self {
            state: Mutex::new(HandleState::Inactive),
            events,
            pending: Mutex::new(Vec::new()),
            behavior,
            timeslice: Mutex::new(None),
            source_id: source.id(),
            mime_type: mime_type.to_string(),
            flush_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Emit a chunk immediately, as a timeslice boundary would
    pub fn emit_chunk(&self, data: impl Into<Vec<u8>>) {
        let _ = self.events.send(HandleEvent::ChunkAvailable(data.into()));
    }

    /// Queue encoded bytes that only a flush or stop will emit
    pub fn push_pending(&self, data: &[u8]) {
        self.pending.lock().extend_from_slice(data);
    }

    /// Report a device failure
    pub fn emit_error(&self, message: &str) {
        let _ = self.events.send(HandleEvent::Error(HandleError::new(message)));
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn timeslice(&self) -> Option<Duration> {
        *self.timeslice.lock()
    }

    pub fn source_id(&self) -> uuid::Uuid {
        self.source_id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn emit_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if !pending.is_empty() {
            let _ = self.events.send(HandleEvent::ChunkAvailable(pending));
        }
    }
}

impl RecorderHandle for SimulatedRecorder {
    fn state(&self) -> HandleState {
        *self.state.lock()
    }

    fn start(&self, timeslice: Duration) -> Result<(), HandleError> {
        let mut state = self.state.lock();
        if *state != HandleState::Inactive {
            return Err(HandleError::new("recorder already started"));
        }
        *state = HandleState::Recording;
        *self.timeslice.lock() = Some(timeslice);
        Ok(())
    }

    fn stop(&self) -> Result<(), HandleError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_stop {
            return Err(HandleError::new("device refused to stop"));
        }

        let was = std::mem::replace(&mut *self.state.lock(), HandleState::Inactive);
        if was == HandleState::Inactive {
            return Err(HandleError::new("recorder is inactive"));
        }

        self.emit_pending();
        if self.behavior.signals_stop {
            let _ = self.events.send(HandleEvent::Stopped);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), HandleError> {
        let mut state = self.state.lock();
        if *state == HandleState::Inactive {
            return Err(HandleError::new("recorder is inactive"));
        }
        *state = HandleState::Paused;
        Ok(())
    }

    fn resume(&self) -> Result<(), HandleError> {
        let mut state = self.state.lock();
        if *state == HandleState::Inactive {
            return Err(HandleError::new("recorder is inactive"));
        }
        *state = HandleState::Recording;
        Ok(())
    }

    fn request_flush(&self) -> Result<(), HandleError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_flush {
            return Err(HandleError::new("flush not supported"));
        }
        if self.state() == HandleState::Inactive {
            return Err(HandleError::new("recorder is inactive"));
        }
        self.emit_pending();
        Ok(())
    }
}

/// Factory that keeps every recorder it builds for inspection
#[derive(Default)]
pub struct SimulatedRecorderFactory {
    behavior: SimulatedBehavior,
    recorders: Mutex<Vec<Arc<SimulatedRecorder>>>,
    create_attempts: AtomicUsize,
    fail_after: Option<usize>,
}

impl SimulatedRecorderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: SimulatedBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Fail every construction after the first `count`
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    /// Recorders built so far, oldest first
    pub fn recorders(&self) -> Vec<Arc<SimulatedRecorder>> {
        self.recorders.lock().clone()
    }

    pub fn latest(&self) -> Option<Arc<SimulatedRecorder>> {
        self.recorders.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.recorders.lock().len()
    }

    /// Construction attempts, including failed ones
    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }
}

impl RecorderFactory for SimulatedRecorderFactory {
    fn create(
        &self,
        source: &Source,
        mime_type: &str,
        _options: &RecorderOptions,
        events: HandleEventSender,
    ) -> Result<Arc<dyn RecorderHandle>, HandleError> {
        let attempt = self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| attempt >= limit) {
            return Err(HandleError::new("encoder unavailable"));
        }

        let recorder = Arc::new(SimulatedRecorder::new(
            source,
            mime_type,
            events,
            self.behavior.clone(),
        ));
        self.recorders.lock().push(recorder.clone());
        Ok(recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_flush_emits_pending_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder = SimulatedRecorder::new(&Source::empty(), "video/webm", tx, SimulatedBehavior::default());
        recorder.start(Duration::from_millis(1000)).unwrap();

        recorder.push_pending(b"abc");
        recorder.request_flush().unwrap();
        recorder.request_flush().unwrap();

        assert_eq!(rx.try_recv().unwrap(), HandleEvent::ChunkAvailable(b"abc".to_vec()));
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.flush_calls(), 2);
    }

    #[test]
    fn test_stop_emits_pending_then_stopped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder = SimulatedRecorder::new(&Source::empty(), "video/webm", tx, SimulatedBehavior::default());
        recorder.start(Duration::from_millis(1000)).unwrap();
        recorder.push_pending(b"tail");

        recorder.stop().unwrap();

        assert_eq!(rx.try_recv().unwrap(), HandleEvent::ChunkAvailable(b"tail".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), HandleEvent::Stopped);
        assert_eq!(recorder.state(), HandleState::Inactive);
        assert!(recorder.stop().is_err());
    }

    #[test]
    fn test_factory_failing_after() {
        let factory = SimulatedRecorderFactory::failing_after(1);
        let source = Source::empty();
        let options = RecorderOptions::default();

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(factory.create(&source, "video/webm", &options, tx.clone()).is_ok());
        assert!(factory.create(&source, "video/webm", &options, tx).is_err());
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.create_attempts(), 2);
    }
}
