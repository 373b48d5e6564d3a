//! Capture trait definitions
//!
//! Platform-agnostic seams for device acquisition. Real backends (camera,
//! microphone, screen) live outside this crate and plug in through these.

use super::source::Source;
use crate::utils::error::AcquisitionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of input line within a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Audio,
    Video,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Audio, ChannelKind::Video];

    /// The other kind
    pub fn opposite(self) -> ChannelKind {
        match self {
            ChannelKind::Audio => ChannelKind::Video,
            ChannelKind::Video => ChannelKind::Audio,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Audio => write!(f, "audio"),
            ChannelKind::Video => write!(f, "video"),
        }
    }
}

/// Information about a capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Kind of channel this device produces
    pub kind: ChannelKind,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Requested properties for one channel kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConstraints {
    /// Specific device to open; the platform default when absent
    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub resolution: Option<Resolution>,

    #[serde(default)]
    pub frame_rate: Option<u32>,
}

impl TrackConstraints {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }
}

/// Acquisition request; a kind left as `None` is not requested at all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub audio: Option<TrackConstraints>,

    #[serde(default)]
    pub video: Option<TrackConstraints>,
}

impl Constraints {
    pub fn audio(track: TrackConstraints) -> Self {
        Self {
            audio: Some(track),
            video: None,
        }
    }

    pub fn video(track: TrackConstraints) -> Self {
        Self {
            audio: None,
            video: Some(track),
        }
    }

    pub fn both(audio: TrackConstraints, video: TrackConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: Some(video),
        }
    }

    /// Constraints for a single kind, if requested
    pub fn get(&self, kind: ChannelKind) -> Option<&TrackConstraints> {
        match kind {
            ChannelKind::Audio => self.audio.as_ref(),
            ChannelKind::Video => self.video.as_ref(),
        }
    }

    /// Kinds this request targets, audio first
    pub fn kinds(&self) -> Vec<ChannelKind> {
        ChannelKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_some())
            .collect()
    }

    /// Copy of this request restricted to exactly one kind
    pub fn only(&self, kind: ChannelKind) -> Constraints {
        match kind {
            ChannelKind::Audio => Constraints {
                audio: self.audio.clone(),
                video: None,
            },
            ChannelKind::Video => Constraints {
                audio: None,
                video: self.video.clone(),
            },
        }
    }
}

/// A hardware-bound input line
pub trait Track: Send + Sync {
    /// Stable identifier of the underlying device grant
    fn id(&self) -> &str;

    fn kind(&self) -> ChannelKind;

    /// Human-readable device label
    fn label(&self) -> &str;

    /// Release the hardware grant. Must be idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Device acquisition collaborator
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Request a source holding one channel per requested kind.
    ///
    /// May block indefinitely while the platform waits on a permission prompt.
    async fn acquire(&self, constraints: &Constraints) -> Result<Source, AcquisitionError>;

    /// List devices able to produce `kind`
    async fn enumerate(&self, kind: ChannelKind) -> Result<Vec<DeviceInfo>, AcquisitionError>;
}
