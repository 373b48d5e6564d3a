//! Recording system module
//!
//! This module implements the continuous-capture recording pipeline:
//! - RecorderHandle/RecorderFactory seam for the platform encoder
//! - CaptureSession state machine with an in-order event dispatcher
//! - Heartbeat stall probing, bounded stop and single-shot recovery

pub mod buffer;
pub mod finalize;
pub mod handle;
pub mod heartbeat;
pub mod recovery;
pub mod session;
pub mod simulated;
pub mod state;
pub mod stop;

pub use buffer::{Chunk, ChunkBuffer};
pub use finalize::{ConcatFinalizer, Container, Finalizer};
pub use handle::{HandleEvent, HandleState, RecorderFactory, RecorderHandle};
pub use heartbeat::HeartbeatMonitor;
pub use recovery::ErrorRecoveryCoordinator;
pub use session::{CaptureSession, SessionEvent};
pub use state::{RecordingSegment, RecordingState};
pub use stop::StopCoordinator;
