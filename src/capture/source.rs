//! Live capture sources
//!
//! A [`Source`] is a shared aggregate of channels. Cloning a source clones the
//! reference, not the channels: every clone observes channel swaps made
//! through any other clone, which is what lets a preview keep running while
//! the microphone changes underneath it.

use super::traits::{ChannelKind, Track};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// One audio or video input line within a source
#[derive(Clone)]
pub struct Channel {
    track: Arc<dyn Track>,
}

impl Channel {
    pub fn new(track: Arc<dyn Track>) -> Self {
        Self { track }
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    pub fn kind(&self) -> ChannelKind {
        self.track.kind()
    }

    pub fn label(&self) -> &str {
        self.track.label()
    }

    pub fn is_live(&self) -> bool {
        self.track.is_live()
    }

    /// Release the hardware grant behind this channel
    pub fn stop(&self) {
        self.track.stop();
    }

    /// Whether both channels wrap the same track object
    pub fn same_track(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.track, &other.track)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("label", &self.label())
            .field("live", &self.is_live())
            .finish()
    }
}

struct SourceInner {
    id: Uuid,
    channels: RwLock<Vec<Channel>>,
}

/// Shared handle to a live set of channels
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

impl Source {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id: Uuid::new_v4(),
                channels: RwLock::new(channels),
            }),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Identity of this source; stable across channel swaps
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether both references point at the same source object
    pub fn same_source(&self, other: &Source) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of the current channels
    pub fn channels(&self) -> Vec<Channel> {
        self.inner.channels.read().clone()
    }

    pub fn channels_of(&self, kind: ChannelKind) -> Vec<Channel> {
        self.inner
            .channels
            .read()
            .iter()
            .filter(|channel| channel.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn has_kind(&self, kind: ChannelKind) -> bool {
        self.inner.channels.read().iter().any(|channel| channel.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.channels.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.channels.read().len()
    }

    /// Add a channel in place
    pub fn attach(&self, channel: Channel) {
        tracing::debug!(
            "Attaching {} channel '{}' to source {}",
            channel.kind(),
            channel.label(),
            self.inner.id
        );
        self.inner.channels.write().push(channel);
    }

    /// Remove every channel of `kind` and return them, still live
    pub fn detach_kind(&self, kind: ChannelKind) -> Vec<Channel> {
        let mut channels = self.inner.channels.write();
        let (detached, kept): (Vec<_>, Vec<_>) =
            channels.drain(..).partition(|channel| channel.kind() == kind);
        *channels = kept;
        detached
    }

    /// Remove every channel and return them, still live
    pub fn detach_all(&self) -> Vec<Channel> {
        std::mem::take(&mut *self.inner.channels.write())
    }

    /// Stop every channel without detaching it
    pub fn stop_all(&self) {
        for channel in self.inner.channels.read().iter() {
            channel.stop();
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("channels", &*self.inner.channels.read())
            .finish()
    }
}
