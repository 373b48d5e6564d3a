//! Stop coordination
//!
//! Finalization races the recorder's own completion signal against a
//! timeout, so a stop always finishes in bounded time even when the device
//! stops signaling. Whatever is buffered when the race resolves becomes the
//! container.

use super::buffer::ChunkBuffer;
use super::finalize::{Container, Finalizer};
use super::handle::{HandleState, RecorderHandle};
use crate::utils::error::{SessionError, SessionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A recorder being stopped, with the flag its dispatcher raises on `Stopped`
pub struct StoppingRecorder {
    pub handle: Arc<dyn RecorderHandle>,
    pub stopped: watch::Receiver<bool>,
}

/// How the completion race was won
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPath {
    /// The recorder signaled completion
    Natural,
    /// The timeout elapsed first
    TimedOut,
    /// There was no live recorder to wait for
    Immediate,
}

/// Finalizes a recording within a bounded time
pub struct StopCoordinator {
    timeout: Duration,
}

impl StopCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Stop `recorder` and assemble the buffered chunks.
    ///
    /// Fails with `NoData` when nothing was buffered, and with `StopFailed`
    /// when the recorder refused to stop. Either way the buffer is drained.
    pub async fn stop(
        &self,
        recorder: Option<StoppingRecorder>,
        buffer: &ChunkBuffer,
        mime_type: &str,
        finalizer: &dyn Finalizer,
    ) -> SessionResult<Container> {
        let mut release_error = None;
        let path = match recorder {
            Some(recorder) => {
                if recorder.handle.state() != HandleState::Inactive {
                    if let Err(e) = recorder.handle.request_flush() {
                        tracing::debug!("Final flush request failed: {}", e);
                    }
                    if let Err(e) = recorder.handle.stop() {
                        tracing::warn!("Recorder stop failed: {}", e);
                        release_error = Some(e);
                    }
                } else {
                    tracing::debug!("Recorder already inactive; finalizing without stop");
                }

                self.race(recorder.stopped).await
            }
            None => StopPath::Immediate,
        };

        let chunks = buffer.take();
        if path == StopPath::TimedOut {
            tracing::warn!(
                "Recorder did not signal completion within {:?}; finalizing {} buffered chunks",
                self.timeout,
                chunks.len()
            );
        }

        if chunks.is_empty() {
            tracing::warn!("Stop finished with no buffered data");
            return Err(SessionError::NoData);
        }

        if let Some(e) = release_error {
            return Err(SessionError::StopFailed(e.to_string()));
        }

        Ok(finalizer.assemble(chunks, mime_type))
    }

    async fn race(&self, mut stopped: watch::Receiver<bool>) -> StopPath {
        let completion = async move {
            // A closed channel means no further events can arrive
            let _ = stopped.wait_for(|done| *done).await;
        };

        tokio::select! {
            _ = completion => StopPath::Natural,
            _ = tokio::time::sleep(self.timeout) => StopPath::TimedOut,
        }
    }
}
