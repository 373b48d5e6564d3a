//! Capture session
//!
//! Top-level state machine for one recording. The session owns at most one
//! recorder handle and one heartbeat at a time. Every mutation (transitions,
//! chunk appends, heartbeat ticks, recovery) runs under one lock, and each
//! handle's events are consumed in order by a single dispatcher task.

use super::buffer::ChunkBuffer;
use super::finalize::{ConcatFinalizer, Container, Finalizer};
use super::handle::{
    HandleEvent, HandleEventReceiver, HandleEventSender, HandleState, RecorderFactory, RecorderHandle,
};
use super::heartbeat::{is_stalled, probe_recorder, HeartbeatMonitor, ProbeOutcome, StallProbe};
use super::recovery::ErrorRecoveryCoordinator;
use super::state::{total_duration_ms, RecordingSegment, RecordingState};
use super::stop::{StopCoordinator, StoppingRecorder};
use crate::capture::{Acquirer, ChannelKind, Constraints, DeviceInfo, Source, StreamContinuityManager};
use crate::config::SessionConfig;
use crate::utils::error::{SessionError, SessionResult};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Events emitted during a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Recording started
    Started,
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// Recording finalized
    Stopped { bytes: usize, duration_ms: f64 },
    /// The recorder failed; a restart is scheduled
    Recovering { error: String },
    /// The recorder was restarted after a failure
    Recovered,
    /// The recording ended without a container
    Failed { error: String },
}

/// How `begin` treats what was captured before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BeginMode {
    /// Caller start: empty buffer, new segment list
    Fresh,
    /// Recovery restart: keep buffered chunks and segments
    Resume,
}

/// The recorder currently bound to the session
pub(super) struct ActiveRecorder {
    pub(super) generation: u64,
    pub(super) handle: Arc<dyn RecorderHandle>,
    pub(super) stopped: watch::Receiver<bool>,
    dispatcher: JoinHandle<()>,
}

impl ActiveRecorder {
    /// Force-stop the handle if it is still running and detach its dispatcher
    pub(super) fn release(self) {
        if self.handle.state() != HandleState::Inactive {
            if let Err(e) = self.handle.stop() {
                tracing::warn!("Failed to stop recorder {}: {}", self.generation, e);
            }
        }
        self.dispatcher.abort();
    }
}

pub(super) struct SessionInner {
    pub(super) state: RecordingState,
    pub(super) source: Option<Source>,
    pub(super) active: Option<ActiveRecorder>,
    pub(super) heartbeat: Option<HeartbeatMonitor>,
    pub(super) pending_recovery: Option<JoinHandle<()>>,
    pub(super) stopping: bool,
    pub(super) last_data: Instant,
    generation: u64,
    started_at: Option<Instant>,
    segments: Vec<RecordingSegment>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: RecordingState::Inactive,
            source: None,
            active: None,
            heartbeat: None,
            pending_recovery: None,
            stopping: false,
            last_data: Instant::now(),
            generation: 0,
            started_at: None,
            segments: Vec::new(),
        }
    }

    /// Whether `generation` is the recorder currently bound to the session
    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    fn process_time_ms(&self) -> f64 {
        self.started_at
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    fn open_segment(&mut self) {
        let index = self.segments.len();
        let now = self.process_time_ms();
        self.segments.push(RecordingSegment::new(index, now));
    }

    pub(super) fn close_segment(&mut self) {
        let now = self.process_time_ms();
        if let Some(segment) = self.segments.last_mut() {
            segment.end(now);
        }
    }

    fn duration_ms(&self) -> f64 {
        total_duration_ms(&self.segments, self.process_time_ms())
    }
}

/// State shared between the session and its background tasks.
///
/// Tasks hold `Weak` references so dropping the session tears everything down.
pub(super) struct Shared {
    pub(super) id: Uuid,
    pub(super) config: SessionConfig,
    pub(super) inner: Mutex<SessionInner>,
    pub(super) buffer: ChunkBuffer,
    pub(super) events: broadcast::Sender<SessionEvent>,
    factory: Arc<dyn RecorderFactory>,
    finalizer: Arc<dyn Finalizer>,
    stop_coordinator: StopCoordinator,
    pub(super) recovery: ErrorRecoveryCoordinator,
}

impl Shared {
    pub(super) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Bind a new recorder to `source` and enter Recording.
    ///
    /// Any recorder still bound is torn down first.
    pub(super) fn begin(
        self: &Arc<Self>,
        inner: &mut SessionInner,
        source: &Source,
        mode: BeginMode,
    ) -> SessionResult<()> {
        if source.is_empty() {
            return Err(SessionError::NoSource);
        }

        if let Some(previous) = inner.active.take() {
            tracing::warn!(
                "Session {}: recorder {} still active at start; tearing it down",
                self.id,
                previous.generation
            );
            previous.release();
        }
        inner.heartbeat = None;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = match self.start_recorder(source, events_tx) {
            Ok(handle) => handle,
            Err(e) => {
                if inner.state.is_active() {
                    inner.close_segment();
                }
                inner.state = RecordingState::Inactive;
                return Err(e);
            }
        };

        if mode == BeginMode::Fresh {
            self.buffer.clear();
            inner.segments.clear();
            inner.started_at = Some(Instant::now());
        }

        inner.generation += 1;
        let generation = inner.generation;
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch(
            Arc::downgrade(self),
            generation,
            events_rx,
            stopped_tx,
        ));

        inner.active = Some(ActiveRecorder {
            generation,
            handle,
            stopped: stopped_rx,
            dispatcher,
        });
        inner.heartbeat = Some(HeartbeatMonitor::spawn(
            Arc::downgrade(self),
            generation,
            &self.config.heartbeat,
        ));
        inner.last_data = Instant::now();
        inner.source = Some(source.clone());
        inner.state = RecordingState::Recording;
        inner.open_segment();

        tracing::info!(
            "Session {}: recorder {} started on source {} ({} channel(s), {}ms timeslice)",
            self.id,
            generation,
            source.id(),
            source.len(),
            self.config.timeslice_ms
        );
        Ok(())
    }

    fn start_recorder(
        &self,
        source: &Source,
        events: HandleEventSender,
    ) -> SessionResult<Arc<dyn RecorderHandle>> {
        let handle = self
            .factory
            .create(source, &self.config.mime_type, &self.config.recorder, events)
            .map_err(|e| SessionError::RecordingFailed(format!("Failed to create recorder: {}", e)))?;
        handle
            .start(self.config.timeslice())
            .map_err(|e| SessionError::RecordingFailed(format!("Failed to start recorder: {}", e)))?;
        Ok(handle)
    }

    fn on_chunk(&self, generation: u64, data: Vec<u8>) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            tracing::debug!(
                "Dropping {} bytes from retired recorder {}",
                data.len(),
                generation
            );
            return;
        }
        if data.is_empty() {
            return;
        }
        if inner.state != RecordingState::Recording && !inner.stopping {
            tracing::debug!("Dropping {} bytes while {}", data.len(), inner.state);
            return;
        }

        let len = data.len();
        let sequence = self.buffer.append(data);
        inner.last_data = Instant::now();
        tracing::debug!("Buffered chunk {} ({} bytes)", sequence, len);
    }

    /// A recorder that ends on its own keeps its buffered data for `stop`
    fn on_stopped(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) || inner.stopping {
            return;
        }

        tracing::warn!(
            "Session {}: recorder {} ended on its own with {} chunks buffered; awaiting stop",
            self.id,
            generation,
            self.buffer.len()
        );
        inner.heartbeat = None;
    }

    async fn finish_stop(self: Arc<Self>, recorder: Option<StoppingRecorder>) -> SessionResult<Container> {
        let result = self
            .stop_coordinator
            .stop(recorder, &self.buffer, &self.config.mime_type, self.finalizer.as_ref())
            .await;

        let duration_ms = {
            let mut inner = self.inner.lock();
            if let Some(active) = inner.active.take() {
                active.release();
            }
            inner.state = RecordingState::Inactive;
            inner.stopping = false;
            inner.duration_ms()
        };

        match &result {
            Ok(container) => {
                tracing::info!(
                    "Session {}: recording stopped. {} bytes in {} chunks, duration {:.0}ms",
                    self.id,
                    container.len(),
                    container.chunk_count(),
                    duration_ms
                );
                self.emit(SessionEvent::Stopped {
                    bytes: container.len(),
                    duration_ms,
                });
            }
            Err(e) => {
                tracing::warn!("Session {}: stop failed: {}", self.id, e);
                self.emit(SessionEvent::Failed {
                    error: e.to_string(),
                });
            }
        }

        result
    }

    fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.heartbeat = None;
        if let Some(task) = inner.pending_recovery.take() {
            task.abort();
        }
        if let Some(active) = inner.active.take() {
            tracing::info!("Session {}: disposing active recorder {}", self.id, active.generation);
            active.release();
        }
        if inner.state.is_active() {
            inner.close_segment();
        }
        inner.state = RecordingState::Inactive;
        self.buffer.clear();
    }
}

impl StallProbe for Shared {
    fn probe(&self, generation: u64, stall_threshold: Duration) -> ProbeOutcome {
        let inner = self.inner.lock();
        let Some(active) = inner.active.as_ref().filter(|a| a.generation == generation) else {
            return ProbeOutcome::Detached;
        };
        if inner.state != RecordingState::Recording || inner.stopping {
            return ProbeOutcome::Idle;
        }
        if !is_stalled(inner.last_data, Instant::now(), stall_threshold) {
            return ProbeOutcome::Healthy;
        }
        probe_recorder(active.handle.as_ref())
    }
}

/// Consume one recorder's events in order
async fn dispatch(
    shared: Weak<Shared>,
    generation: u64,
    mut events: HandleEventReceiver,
    stopped: watch::Sender<bool>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        match event {
            HandleEvent::ChunkAvailable(data) => shared.on_chunk(generation, data),
            HandleEvent::Error(error) => shared.recovery.on_error(&shared, generation, error),
            HandleEvent::Stopped => {
                tracing::debug!("Recorder {} signaled stop", generation);
                stopped.send_replace(true);
                shared.on_stopped(generation);
            }
        }
    }
}

/// A continuous-capture recording session
pub struct CaptureSession {
    shared: Arc<Shared>,
    continuity: StreamContinuityManager,
}

impl CaptureSession {
    /// Create an inactive session that finalizes by concatenation
    pub fn new(
        config: SessionConfig,
        factory: Arc<dyn RecorderFactory>,
        acquirer: Arc<dyn Acquirer>,
    ) -> SessionResult<Self> {
        Self::with_finalizer(config, factory, acquirer, Arc::new(ConcatFinalizer))
    }

    pub fn with_finalizer(
        config: SessionConfig,
        factory: Arc<dyn RecorderFactory>,
        acquirer: Arc<dyn Acquirer>,
        finalizer: Arc<dyn Finalizer>,
    ) -> SessionResult<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(100);
        let continuity = StreamContinuityManager::new(
            acquirer,
            config.acquisition_timeout(),
            config.stabilization_delay(),
        );
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            stop_coordinator: StopCoordinator::new(config.stop_timeout()),
            recovery: ErrorRecoveryCoordinator::new(config.recovery_backoff()),
            config,
            inner: Mutex::new(SessionInner::new()),
            buffer: ChunkBuffer::new(),
            events,
            factory,
            finalizer,
        });

        tracing::debug!("Created capture session {}", shared.id);
        Ok(Self { shared, continuity })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Get the current recording state
    pub fn get_state(&self) -> RecordingState {
        self.shared.inner.lock().state
    }

    /// The source the session last started on
    pub fn source(&self) -> Option<Source> {
        self.shared.inner.lock().source.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.shared.buffer.total_bytes()
    }

    /// Recorded time in milliseconds, excluding pauses and recovery gaps
    pub fn duration_ms(&self) -> f64 {
        self.shared.inner.lock().duration_ms()
    }

    pub fn segments(&self) -> Vec<RecordingSegment> {
        self.shared.inner.lock().segments.clone()
    }

    /// Acquire a source for the given constraints, bounded by the acquisition timeout
    pub async fn open_source(&self, constraints: &Constraints) -> SessionResult<Source> {
        self.continuity.acquire(constraints).await
    }

    /// List devices able to produce `kind`
    pub async fn devices(&self, kind: ChannelKind) -> SessionResult<Vec<DeviceInfo>> {
        self.continuity.enumerate(kind).await
    }

    /// Start recording `source` from an empty buffer.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self, source: &Source) -> SessionResult<()> {
        let mut inner = self.shared.inner.lock();
        if inner.stopping {
            return Err(SessionError::RecordingFailed(
                "A previous recording is still being finalized".to_string(),
            ));
        }
        if let Some(task) = inner.pending_recovery.take() {
            tracing::info!("Session {}: start supersedes pending recovery", self.shared.id);
            task.abort();
        }

        self.shared.begin(&mut inner, source, BeginMode::Fresh)?;
        drop(inner);

        self.shared.emit(SessionEvent::Started);
        Ok(())
    }

    /// Stop recording and return the finalized container.
    ///
    /// Completes within the configured stop timeout even if the recorder never
    /// signals completion. Dropping the returned future does not cancel
    /// finalization.
    pub async fn stop(&self) -> SessionResult<Container> {
        let recorder = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_active() || inner.stopping {
                return Err(SessionError::NotRecording);
            }

            inner.stopping = true;
            inner.heartbeat = None;
            if let Some(task) = inner.pending_recovery.take() {
                tracing::info!("Session {}: stop abandons pending recovery", self.shared.id);
                task.abort();
            }
            inner.close_segment();

            inner.active.as_ref().map(|active| StoppingRecorder {
                handle: active.handle.clone(),
                stopped: active.stopped.clone(),
            })
        };

        tracing::info!(
            "Session {}: stopping with {} buffered chunks",
            self.shared.id,
            self.shared.buffer.len()
        );

        let shared = self.shared.clone();
        tokio::spawn(shared.finish_stop(recorder))
            .await
            .map_err(|e| SessionError::StopFailed(e.to_string()))?
    }

    /// Pause recording. Ignored unless currently recording.
    pub fn pause(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state != RecordingState::Recording || inner.stopping {
            tracing::debug!("Ignoring pause while {}", inner.state);
            return;
        }
        let Some(active) = inner.active.as_ref() else {
            tracing::debug!("Ignoring pause while recovery is pending");
            return;
        };
        if let Err(e) = active.handle.pause() {
            tracing::warn!("Recorder refused to pause: {}", e);
            return;
        }

        inner.state = RecordingState::Paused;
        inner.close_segment();
        drop(inner);

        tracing::info!("Session {}: paused", self.shared.id);
        self.shared.emit(SessionEvent::Paused);
    }

    /// Resume recording. Ignored unless currently paused.
    pub fn resume(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state != RecordingState::Paused || inner.stopping {
            tracing::debug!("Ignoring resume while {}", inner.state);
            return;
        }
        let Some(active) = inner.active.as_ref() else {
            return;
        };
        if let Err(e) = active.handle.resume() {
            tracing::warn!("Recorder refused to resume: {}", e);
            return;
        }

        inner.state = RecordingState::Recording;
        inner.last_data = Instant::now();
        inner.open_segment();
        drop(inner);

        tracing::info!("Session {}: resumed", self.shared.id);
        self.shared.emit(SessionEvent::Resumed);
    }

    /// Apply new device constraints to `source`; see [`StreamContinuityManager::update_channels`].
    ///
    /// Call between recordings. A running recorder keeps encoding the tracks
    /// it was started with until the next `start`.
    pub async fn update_channels(
        &self,
        source: &Source,
        constraints: &Constraints,
    ) -> SessionResult<Source> {
        if self.get_state() == RecordingState::Recording {
            tracing::warn!(
                "Session {}: updating channels while recording; restart to record the new channels",
                self.shared.id
            );
        }
        self.continuity.update_channels(source, constraints).await
    }

    /// Cancel every timer and release the recorder
    pub fn dispose(&self) {
        self.shared.shutdown();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}
