//! Capture sources and device acquisition
//!
//! This module provides the source/channel model, the acquisition seam that
//! platform backends implement, and channel swapping on a live source.

pub mod continuity;
pub mod simulated;
pub mod source;
pub mod traits;

pub use continuity::StreamContinuityManager;
pub use source::{Channel, Source};
pub use traits::{
    Acquirer, ChannelKind, Constraints, DeviceInfo, Resolution, Track, TrackConstraints,
};
