//! Recorder handle seam
//!
//! A recorder handle encodes a source into timesliced chunks. Handles report
//! back through an event queue rather than callbacks; the session runs one
//! dispatcher per handle that consumes the queue in order.

use crate::capture::Source;
use crate::config::RecorderOptions;
use crate::utils::error::HandleError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// State reported by the recorder itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    Inactive,
    Recording,
    Paused,
}

/// Events emitted by a recorder handle
#[derive(Debug, Clone, PartialEq)]
pub enum HandleEvent {
    /// Encoded data since the previous chunk
    ChunkAvailable(Vec<u8>),
    /// The device or encoder failed mid-session
    Error(HandleError),
    /// The recorder has emitted its last chunk
    Stopped,
}

pub type HandleEventSender = mpsc::UnboundedSender<HandleEvent>;
pub type HandleEventReceiver = mpsc::UnboundedReceiver<HandleEvent>;

/// An active encoder bound to one source
pub trait RecorderHandle: Send + Sync {
    fn state(&self) -> HandleState;

    /// Begin emitting a chunk every `timeslice`
    fn start(&self, timeslice: Duration) -> Result<(), HandleError>;

    /// Emit any pending data, then `Stopped`, and release the device
    fn stop(&self) -> Result<(), HandleError>;

    fn pause(&self) -> Result<(), HandleError>;

    fn resume(&self) -> Result<(), HandleError>;

    /// Emit whatever data is pending as a chunk right away
    fn request_flush(&self) -> Result<(), HandleError>;
}

/// Builds recorder handles for a session
pub trait RecorderFactory: Send + Sync {
    /// Construct a handle over `source`; it must report through `events`
    fn create(
        &self,
        source: &Source,
        mime_type: &str,
        options: &RecorderOptions,
        events: HandleEventSender,
    ) -> Result<Arc<dyn RecorderHandle>, HandleError>;
}
