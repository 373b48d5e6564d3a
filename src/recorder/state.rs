//! Recording state management
//!
//! Defines the session state machine and segment tracking.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Inactive,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
}

impl RecordingState {
    /// Whether a recording exists that `stop` can finalize
    pub fn is_active(&self) -> bool {
        !matches!(self, RecordingState::Inactive)
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Inactive => write!(f, "inactive"),
            RecordingState::Recording => write!(f, "recording"),
            RecordingState::Paused => write!(f, "paused"),
        }
    }
}

/// One uninterrupted stretch of recording
///
/// A new segment opens on start, resume and recovery restart; it closes on
/// pause, stop or a recorder error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSegment {
    /// Segment index (0, 1, 2, ...)
    pub index: usize,

    /// Duration of this segment in milliseconds
    pub duration_ms: f64,

    /// Process time when the segment started (relative to session start)
    pub process_time_start_ms: f64,

    /// Process time when the segment ended
    pub process_time_end_ms: f64,

    /// Unix timestamp when the segment started
    pub unix_start_ms: u64,

    /// Unix timestamp when the segment ended
    pub unix_end_ms: u64,

    /// Whether the segment has been closed
    pub closed: bool,
}

impl RecordingSegment {
    /// Open a new segment starting now
    pub fn new(index: usize, process_time_ms: f64) -> Self {
        let now = Utc::now().timestamp_millis() as u64;
        Self {
            index,
            duration_ms: 0.0,
            process_time_start_ms: process_time_ms,
            process_time_end_ms: process_time_ms,
            unix_start_ms: now,
            unix_end_ms: now,
            closed: false,
        }
    }

    /// Close the segment. Closing twice keeps the first end time.
    pub fn end(&mut self, process_time_ms: f64) {
        if self.closed {
            return;
        }
        self.process_time_end_ms = process_time_ms;
        self.duration_ms = self.process_time_end_ms - self.process_time_start_ms;
        self.unix_end_ms = Utc::now().timestamp_millis() as u64;
        self.closed = true;
    }
}

/// Total recorded time across segments; the open segment counts up to `now_ms`
pub fn total_duration_ms(segments: &[RecordingSegment], now_ms: f64) -> f64 {
    segments
        .iter()
        .map(|segment| {
            if segment.closed {
                segment.duration_ms
            } else {
                now_ms - segment.process_time_start_ms
            }
        })
        .sum()
}
