//! Capture Session - continuous media capture that survives device trouble.
//!
//! This crate records a live audio/video source into timesliced chunks and
//! finalizes them into a single container. It keeps recording through
//! stalled encoders, recorder failures and device swaps.

pub mod capture;
pub mod config;
pub mod recorder;
pub mod utils;

pub use capture::{Acquirer, ChannelKind, Constraints, Source, StreamContinuityManager, TrackConstraints};
pub use config::SessionConfig;
pub use recorder::{CaptureSession, Container, RecordingState, SessionEvent};
pub use utils::{AcquisitionError, SessionError, SessionResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capture_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting capture-session v{}", env!("CARGO_PKG_VERSION"));
    }
}
