//! Heartbeat monitor
//!
//! Periodically probes a recording for stalls. When no chunk has arrived for
//! longer than the stall threshold, the monitor asks the recorder to flush as
//! a liveness probe. Probe failures are logged and never fail the session.

use super::handle::RecorderHandle;
use crate::config::HeartbeatConfig;
use crate::utils::error::HandleError;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Result of one heartbeat tick
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Data is flowing
    Healthy,
    /// Not currently recording; nothing to probe
    Idle,
    /// Stalled; a flush was requested
    Flushed,
    /// Stalled; the flush request failed
    FlushFailed(HandleError),
    /// The monitored recorder is gone; the monitor should exit
    Detached,
}

/// Something a heartbeat can probe
pub trait StallProbe: Send + Sync + 'static {
    /// Inspect the recorder bound to `generation` and flush it if stalled.
    ///
    /// Runs with the session's state serialized so a tick never interleaves
    /// with a transition.
    fn probe(&self, generation: u64, stall_threshold: Duration) -> ProbeOutcome;
}

/// Whether the gap since the last chunk exceeds the threshold
pub fn is_stalled(last_data: Instant, now: Instant, stall_threshold: Duration) -> bool {
    now.saturating_duration_since(last_data) > stall_threshold
}

/// Request a flush from a stalled recorder
pub fn probe_recorder(handle: &dyn RecorderHandle) -> ProbeOutcome {
    match handle.request_flush() {
        Ok(()) => ProbeOutcome::Flushed,
        Err(e) => ProbeOutcome::FlushFailed(e),
    }
}

/// Timer task bound to one recorder generation
pub struct HeartbeatMonitor {
    task: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Start ticking against `target`. The first tick fires one interval from now.
    pub fn spawn<P: StallProbe>(target: Weak<P>, generation: u64, config: &HeartbeatConfig) -> Self {
        let period = config.interval();
        let stall_threshold = config.stall_threshold();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(target) = target.upgrade() else {
                    break;
                };

                match target.probe(generation, stall_threshold) {
                    ProbeOutcome::Healthy | ProbeOutcome::Idle => {}
                    ProbeOutcome::Flushed => {
                        tracing::debug!(
                            "No data for over {:?}; requested flush from recorder {}",
                            stall_threshold,
                            generation
                        );
                    }
                    ProbeOutcome::FlushFailed(e) => {
                        tracing::warn!("Heartbeat flush on recorder {} failed: {}", generation, e);
                    }
                    ProbeOutcome::Detached => {
                        tracing::debug!("Heartbeat for recorder {} detached", generation);
                        break;
                    }
                }
            }
        });

        Self { task }
    }

}

/// Dropping the monitor stops ticking; no probe runs afterwards.
impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_is_stalled() {
        let start = Instant::now();
        let threshold = Duration::from_millis(1000);
        assert!(!is_stalled(start, start + Duration::from_millis(1000), threshold));
        assert!(is_stalled(start, start + Duration::from_millis(1001), threshold));
        // Clock skew never reports a stall
        assert!(!is_stalled(start + Duration::from_secs(5), start, threshold));
    }

    struct CountingProbe {
        ticks: Mutex<Vec<u64>>,
        detach_after: usize,
    }

    impl StallProbe for CountingProbe {
        fn probe(&self, generation: u64, _stall_threshold: Duration) -> ProbeOutcome {
            let mut ticks = self.ticks.lock();
            ticks.push(generation);
            if ticks.len() >= self.detach_after {
                ProbeOutcome::Detached
            } else {
                ProbeOutcome::Healthy
            }
        }
    }

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval_ms: 2000,
            stall_threshold_ms: 1000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval() {
        let probe = Arc::new(CountingProbe {
            ticks: Mutex::new(Vec::new()),
            detach_after: usize::MAX,
        });
        let monitor = HeartbeatMonitor::spawn(Arc::downgrade(&probe), 7, &config());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(probe.ticks.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(4200)).await;
        assert_eq!(*probe.ticks.lock(), vec![7, 7, 7]);
        drop(monitor);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_ticks() {
        let probe = Arc::new(CountingProbe {
            ticks: Mutex::new(Vec::new()),
            detach_after: usize::MAX,
        });
        let monitor = HeartbeatMonitor::spawn(Arc::downgrade(&probe), 1, &config());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        drop(monitor);
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        assert_eq!(probe.ticks.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_probe_ends_monitor() {
        let probe = Arc::new(CountingProbe {
            ticks: Mutex::new(Vec::new()),
            detach_after: 2,
        });
        let _monitor = HeartbeatMonitor::spawn(Arc::downgrade(&probe), 3, &config());

        tokio::time::sleep(Duration::from_millis(20_000)).await;
        assert_eq!(probe.ticks.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_target_ends_monitor() {
        let probe = Arc::new(CountingProbe {
            ticks: Mutex::new(Vec::new()),
            detach_after: usize::MAX,
        });
        let monitor = HeartbeatMonitor::spawn(Arc::downgrade(&probe), 3, &config());
        drop(probe);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(monitor.task.is_finished());
    }
}
