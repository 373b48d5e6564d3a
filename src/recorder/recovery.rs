//! Error recovery
//!
//! A recorder error mid-session triggers at most one restart against the same
//! source, and only when there is buffered data worth continuing. Buffered
//! chunks survive the restart; the gap is bounded by the backoff.

use super::session::{BeginMode, SessionEvent, Shared};
use super::state::RecordingState;
use crate::capture::Source;
use crate::utils::error::{HandleError, SessionError};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Single-shot, buffer-aware restart of a failed recorder
pub struct ErrorRecoveryCoordinator {
    backoff: Duration,
}

impl ErrorRecoveryCoordinator {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Handle an error reported by recorder `generation`
    pub(super) fn on_error(&self, shared: &Arc<Shared>, generation: u64, error: HandleError) {
        let mut inner = shared.inner.lock();
        if !inner.is_current(generation) {
            tracing::debug!("Ignoring error from retired recorder {}: {}", generation, error);
            return;
        }
        if inner.stopping {
            tracing::warn!("Recorder {} failed while stopping: {}", generation, error);
            return;
        }

        tracing::warn!("Session {}: recorder {} failed: {}", shared.id, generation, error);
        inner.heartbeat = None;
        inner.close_segment();

        let Some(failing) = inner.active.take() else {
            return;
        };
        let source = match inner.source.clone() {
            Some(source) if !shared.buffer.is_empty() => source,
            _ => {
                inner.state = RecordingState::Inactive;
                drop(inner);

                failing.release();
                let failure = SessionError::RecordingFailed(error.to_string());
                tracing::error!("Session {}: no data buffered; {}", shared.id, failure);
                shared.emit(SessionEvent::Failed {
                    error: failure.to_string(),
                });
                return;
            }
        };

        // Released before spawning; an aborted restart task may never run
        failing.release();

        tracing::info!(
            "Session {}: restarting recorder in {:?} with {} chunks buffered",
            shared.id,
            self.backoff,
            shared.buffer.len()
        );
        inner.pending_recovery = Some(tokio::spawn(restart(
            Arc::downgrade(shared),
            source,
            self.backoff,
        )));
        drop(inner);

        shared.emit(SessionEvent::Recovering {
            error: error.to_string(),
        });
    }
}

async fn restart(shared: Weak<Shared>, source: Source, backoff: Duration) {
    tokio::time::sleep(backoff).await;

    let Some(shared) = shared.upgrade() else {
        return;
    };

    let result = {
        let mut inner = shared.inner.lock();
        inner.pending_recovery = None;
        if inner.state == RecordingState::Inactive || inner.stopping {
            tracing::info!("Session {}: recording ended before restart", shared.id);
            return;
        }

        let result = shared.begin(&mut inner, &source, BeginMode::Resume);
        if result.is_err() {
            inner.state = RecordingState::Inactive;
            shared.buffer.clear();
        }
        result
    };

    match result {
        Ok(()) => {
            tracing::info!("Session {}: recorder restarted", shared.id);
            shared.emit(SessionEvent::Recovered);
        }
        Err(e) => {
            let failure = SessionError::RecordingFailed(format!("restart failed: {}", e));
            tracing::error!("Session {}: {}", shared.id, failure);
            shared.emit(SessionEvent::Failed {
                error: failure.to_string(),
            });
        }
    }
}
