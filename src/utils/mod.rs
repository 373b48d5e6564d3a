//! Shared utilities

pub mod error;

pub use error::{AcquisitionError, ErrorResponse, HandleError, SessionError, SessionResult};
