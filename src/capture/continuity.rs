//! Stream continuity
//!
//! Swaps one channel kind of a live source while leaving the other kind
//! alone. The swap releases the old grant before requesting the new one so
//! the platform never holds two grants of the same kind; a failed
//! acquisition therefore leaves the source without that kind.

use super::source::Source;
use super::traits::{Acquirer, ChannelKind, Constraints, DeviceInfo};
use crate::utils::error::{AcquisitionError, SessionResult};
use std::sync::Arc;
use std::time::Duration;

/// Manages device grants and in-place channel swaps for a session
pub struct StreamContinuityManager {
    acquirer: Arc<dyn Acquirer>,
    acquisition_timeout: Duration,
    stabilization_delay: Duration,
}

impl StreamContinuityManager {
    pub fn new(
        acquirer: Arc<dyn Acquirer>,
        acquisition_timeout: Duration,
        stabilization_delay: Duration,
    ) -> Self {
        Self {
            acquirer,
            acquisition_timeout,
            stabilization_delay,
        }
    }

    /// Initial acquisition, bounded by the acquisition timeout
    pub async fn acquire(&self, constraints: &Constraints) -> SessionResult<Source> {
        tracing::info!("Acquiring source for {:?}", constraints.kinds());

        let timeout_ms = self.acquisition_timeout.as_millis() as u64;
        let source = tokio::time::timeout(self.acquisition_timeout, self.acquirer.acquire(constraints))
            .await
            .map_err(|_| {
                tracing::warn!("Device acquisition did not complete within {}ms", timeout_ms);
                AcquisitionError::Timeout(timeout_ms)
            })??;

        tracing::info!("Acquired source {} with {} channel(s)", source.id(), source.len());
        Ok(source)
    }

    /// Devices able to produce `kind`
    pub async fn enumerate(&self, kind: ChannelKind) -> SessionResult<Vec<DeviceInfo>> {
        Ok(self.acquirer.enumerate(kind).await?)
    }

    /// Apply new constraints to `source`.
    ///
    /// When only one kind is targeted and the source already carries the
    /// other kind, the targeted kind is swapped in place and the returned
    /// source is `source` itself. Otherwise the whole source is replaced and
    /// a new source is returned.
    pub async fn update_channels(
        &self,
        source: &Source,
        constraints: &Constraints,
    ) -> SessionResult<Source> {
        let targeted = constraints.kinds();
        if targeted.is_empty() {
            tracing::debug!("No channel kinds targeted; keeping source {}", source.id());
            return Ok(source.clone());
        }

        let updated = match targeted.as_slice() {
            [kind] if source.has_kind(kind.opposite()) => {
                self.swap_in_place(source, *kind, constraints).await?
            }
            _ => self.replace(source, constraints).await?,
        };

        tokio::time::sleep(self.stabilization_delay).await;
        Ok(updated)
    }

    async fn swap_in_place(
        &self,
        source: &Source,
        kind: ChannelKind,
        constraints: &Constraints,
    ) -> SessionResult<Source> {
        tracing::info!("Swapping {} channel of source {} in place", kind, source.id());

        for channel in source.detach_kind(kind) {
            tracing::debug!("Releasing {} channel '{}'", kind, channel.label());
            channel.stop();
        }

        let replacement = match self.acquirer.acquire(&constraints.only(kind)).await {
            Ok(replacement) => replacement,
            Err(e) => {
                tracing::warn!(
                    "Failed to acquire replacement {} channel; source {} is left without one: {}",
                    kind,
                    source.id(),
                    e
                );
                return Err(e.into());
            }
        };

        for channel in replacement.detach_all() {
            if channel.kind() == kind {
                source.attach(channel);
            } else {
                tracing::warn!(
                    "Acquirer returned unrequested {} channel '{}'; releasing it",
                    channel.kind(),
                    channel.label()
                );
                channel.stop();
            }
        }

        Ok(source.clone())
    }

    async fn replace(&self, source: &Source, constraints: &Constraints) -> SessionResult<Source> {
        tracing::info!(
            "Replacing source {} for {:?}",
            source.id(),
            constraints.kinds()
        );

        source.stop_all();
        let replacement = self.acquirer.acquire(constraints).await?;
        Ok(replacement)
    }
}
