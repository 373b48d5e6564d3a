//! Error types and handling
//!
//! Common error types used across the capture session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session-wide error type
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not recording")]
    NotRecording,

    #[error("Cannot start recording: source has no audio or video channel")]
    NoSource,

    #[error("No data was captured")]
    NoData,

    #[error("Failed to stop recorder: {0}")]
    StopFailed(String),

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Device acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while acquiring capture devices
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device acquisition timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),
}

/// Failure reported by a recorder handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandleError(pub String);

impl HandleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error response for callers bridging to a UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<SessionError> for ErrorResponse {
    fn from(error: SessionError) -> Self {
        let code = match &error {
            SessionError::NotRecording => "NOT_RECORDING",
            SessionError::NoSource => "NO_SOURCE",
            SessionError::NoData => "NO_DATA",
            SessionError::StopFailed(_) => "STOP_FAILED",
            SessionError::RecordingFailed(_) => "RECORDING_FAILED",
            SessionError::Acquisition(AcquisitionError::Timeout(_)) => "ACQUISITION_TIMEOUT",
            SessionError::Acquisition(AcquisitionError::PermissionDenied(_)) => "PERMISSION_DENIED",
            SessionError::Acquisition(_) => "ACQUISITION_FAILED",
            SessionError::Config(_) => "CONFIG_ERROR",
            SessionError::Io(_) => "IO_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;
