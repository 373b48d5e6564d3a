//! In-memory capture backend
//!
//! Tracks and an acquirer with no hardware behind them. Used for tests and
//! for running a session without devices.

use super::source::{Channel, Source};
use super::traits::{Acquirer, ChannelKind, Constraints, DeviceInfo, Track};
use crate::utils::error::AcquisitionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Track whose only state is whether it has been stopped
pub struct SimulatedTrack {
    id: String,
    kind: ChannelKind,
    label: String,
    live: AtomicBool,
    stop_calls: AtomicUsize,
}

impl SimulatedTrack {
    pub fn new(kind: ChannelKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl Track for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Acquirer that grants simulated tracks and records every request
#[derive(Default)]
pub struct SimulatedAcquirer {
    devices: Vec<DeviceInfo>,
    requests: Mutex<Vec<Constraints>>,
    failures: Mutex<VecDeque<AcquisitionError>>,
    granted: Mutex<Vec<Arc<SimulatedTrack>>>,
    peak_live: Mutex<HashMap<ChannelKind, usize>>,
    delay: Option<Duration>,
}

impl SimulatedAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquirer that enumerates the given devices
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            ..Self::default()
        }
    }

    /// Acquirer whose grants take `delay`, as if waiting on a permission prompt
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make the next acquisition fail with `error`
    pub fn fail_next(&self, error: AcquisitionError) {
        self.failures.lock().push_back(error);
    }

    /// Every constraint set passed to `acquire`, in order
    pub fn requests(&self) -> Vec<Constraints> {
        self.requests.lock().clone()
    }

    /// Highest number of simultaneously live grants of `kind` seen at acquisition time
    pub fn peak_live(&self, kind: ChannelKind) -> usize {
        self.peak_live.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Currently live grants of `kind`
    pub fn live(&self, kind: ChannelKind) -> usize {
        self.granted
            .lock()
            .iter()
            .filter(|track| track.kind() == kind && track.is_live())
            .count()
    }

    fn label_for(&self, kind: ChannelKind, constraints: &Constraints) -> String {
        constraints
            .get(kind)
            .and_then(|track| track.device_id.clone())
            .or_else(|| {
                self.devices
                    .iter()
                    .find(|device| device.kind == kind && device.is_default)
                    .map(|device| device.id.clone())
            })
            .unwrap_or_else(|| format!("default-{}", kind))
    }
}

#[async_trait]
impl Acquirer for SimulatedAcquirer {
    async fn acquire(&self, constraints: &Constraints) -> Result<Source, AcquisitionError> {
        self.requests.lock().push(constraints.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let kinds = constraints.kinds();
        if kinds.is_empty() {
            return Err(AcquisitionError::Failed(
                "At least one of audio or video must be requested".to_string(),
            ));
        }

        let mut channels = Vec::new();
        let mut granted = self.granted.lock();
        for kind in kinds {
            let track = Arc::new(SimulatedTrack::new(kind, self.label_for(kind, constraints)));
            granted.push(track.clone());
            channels.push(Channel::new(track));
        }

        let mut peak = self.peak_live.lock();
        for kind in ChannelKind::ALL {
            let live = granted
                .iter()
                .filter(|track| track.kind() == kind && track.is_live())
                .count();
            let entry = peak.entry(kind).or_insert(0);
            *entry = (*entry).max(live);
        }

        Ok(Source::new(channels))
    }

    async fn enumerate(&self, kind: ChannelKind) -> Result<Vec<DeviceInfo>, AcquisitionError> {
        Ok(self
            .devices
            .iter()
            .filter(|device| device.kind == kind)
            .cloned()
            .collect())
    }
}
