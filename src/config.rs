//! Session configuration
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. Environment variables (CAPTURE_SESSION_*)
//!
//! Every field has a default, so a config file only needs the keys it changes.

use crate::utils::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Encoder options passed through to the recorder untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderOptions {
    #[serde(default)]
    pub audio_bits_per_second: Option<u32>,

    #[serde(default)]
    pub video_bits_per_second: Option<u32>,
}

/// Stall probe timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// How often the monitor ticks
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,

    /// Silence longer than this while recording counts as a stall
    #[serde(default = "default_stall_threshold_ms")]
    pub stall_threshold_ms: u64,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval_ms(),
            stall_threshold_ms: default_stall_threshold_ms(),
        }
    }
}

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Declared content type of the finalized container
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Recorder timeslice; bounds data loss on a crash to one slice
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Upper bound on waiting for the recorder to signal completion
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Pause between force-stopping a failed recorder and restarting
    #[serde(default = "default_recovery_backoff_ms")]
    pub recovery_backoff_ms: u64,

    /// Settle time after attaching a swapped channel
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,

    /// Ceiling on the initial device grant
    #[serde(default = "default_acquisition_timeout_ms")]
    pub acquisition_timeout_ms: u64,

    #[serde(default)]
    pub recorder: RecorderOptions,
}

fn default_mime_type() -> String {
    "video/webm;codecs=vp9,opus".to_string()
}

fn default_timeslice_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_ms() -> u64 {
    2000
}

fn default_stall_threshold_ms() -> u64 {
    1000
}

fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_recovery_backoff_ms() -> u64 {
    500
}

fn default_stabilization_delay_ms() -> u64 {
    300
}

fn default_acquisition_timeout_ms() -> u64 {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mime_type: default_mime_type(),
            timeslice_ms: default_timeslice_ms(),
            heartbeat: HeartbeatConfig::default(),
            stop_timeout_ms: default_stop_timeout_ms(),
            recovery_backoff_ms: default_recovery_backoff_ms(),
            stabilization_delay_ms: default_stabilization_delay_ms(),
            acquisition_timeout_ms: default_acquisition_timeout_ms(),
            recorder: RecorderOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> SessionResult<Self> {
        let config: SessionConfig = toml::from_str(contents)
            .map_err(|e| SessionError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> SessionResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::debug!("Loading session config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)
                    .map_err(|e| SessionError::Config(format!("Invalid config: {}", e)))?
            }
            Some(path) => {
                tracing::debug!("Config file not found at {:?}, using defaults", path);
                SessionConfig::default()
            }
            None => SessionConfig::default(),
        };

        if let Ok(mime_type) = std::env::var("CAPTURE_SESSION_MIME_TYPE") {
            config.mime_type = mime_type;
        }
        if let Ok(timeout) = std::env::var("CAPTURE_SESSION_STOP_TIMEOUT_MS") {
            config.stop_timeout_ms = timeout.parse().map_err(|_| {
                SessionError::Config(format!("CAPTURE_SESSION_STOP_TIMEOUT_MS is not a number: {}", timeout))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the session unusable
    pub fn validate(&self) -> SessionResult<()> {
        if self.mime_type.trim().is_empty() {
            return Err(SessionError::Config("mime_type must not be empty".to_string()));
        }

        let durations = [
            ("timeslice_ms", self.timeslice_ms),
            ("heartbeat.interval_ms", self.heartbeat.interval_ms),
            ("heartbeat.stall_threshold_ms", self.heartbeat.stall_threshold_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("acquisition_timeout_ms", self.acquisition_timeout_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(SessionError::Config(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition_timeout_ms)
    }
}
