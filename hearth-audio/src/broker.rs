//! Audio Broker
//!
//! Sole authority over which playback source may produce sound. Before a
//! source is granted, the previous owner is told to stop (revoked) and given a
//! bounded time to comply.
//!
//! Acquisitions are single-flight: a tokio Mutex (FIFO-fair) queues overlapping
//! requests so two revoke sequences never interleave. The active value lives in
//! a `watch` channel so readers never wait on an in-flight acquisition.

use async_trait::async_trait;
use hearth_common::events::PlaybackSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Component that owns a playback source and can be told to go quiet
#[async_trait]
pub trait SourceOwner: Send + Sync {
    /// Stop producing sound
    ///
    /// The broker runs this on its own task, so it reaches a terminal state
    /// even when the broker stops waiting for it.
    async fn revoke(&self) -> Result<()>;
}

/// How the previous owner's revoke ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeResult {
    /// No other source was active
    NotNeeded,
    /// Owner acknowledged within the bound
    Completed,
    /// Owner reported a failure; the grant proceeded anyway
    Failed(String),
    /// Owner did not finish within the bound; the grant proceeded anyway
    TimedOut,
}

/// Result of an acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOutcome {
    /// Source that was active before the call
    pub previous: PlaybackSource,
    pub revoke: RevokeResult,
}

impl AcquireOutcome {
    /// Whether the active source actually changed
    pub fn changed(&self, requested: PlaybackSource) -> bool {
        self.previous != requested
    }
}

/// Arbitration authority for the single active source
pub struct AudioBroker {
    owners: HashMap<PlaybackSource, Arc<dyn SourceOwner>>,
    active: watch::Sender<PlaybackSource>,
    /// Single-flight guard for acquire/release
    in_flight: Mutex<()>,
    revoke_timeout: Duration,
}

impl AudioBroker {
    pub fn new(revoke_timeout: Duration) -> Self {
        let (active, _) = watch::channel(PlaybackSource::None);
        Self {
            owners: HashMap::new(),
            active,
            in_flight: Mutex::new(()),
            revoke_timeout,
        }
    }

    /// Register the owner revoked when `source` must give way
    pub fn with_owner(mut self, source: PlaybackSource, owner: Arc<dyn SourceOwner>) -> Self {
        self.owners.insert(source, owner);
        self
    }

    /// Currently active source (no side effects)
    pub fn active(&self) -> PlaybackSource {
        *self.active.borrow()
    }

    /// Watch active-source changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSource> {
        self.active.subscribe()
    }

    /// Grant `source`, revoking whichever other source is active first
    pub async fn acquire(&self, source: PlaybackSource) -> Result<AcquireOutcome> {
        if source == PlaybackSource::None {
            return Err(Error::BadRequest("cannot acquire the None source".to_string()));
        }

        let _flight = self.in_flight.lock().await;
        let previous = self.active();

        if previous == source {
            debug!("Broker: {} already active", source);
            return Ok(AcquireOutcome {
                previous,
                revoke: RevokeResult::NotNeeded,
            });
        }

        let revoke = if previous == PlaybackSource::None {
            RevokeResult::NotNeeded
        } else {
            self.revoke(previous).await
        };

        self.active.send_replace(source);
        info!("Broker: active source {} -> {}", previous, source);

        Ok(AcquireOutcome { previous, revoke })
    }

    /// Clear the active source if, and only if, it is still `source`
    ///
    /// A stale release from an older acquisition is a no-op. Returns whether
    /// the active source changed.
    pub async fn release(&self, source: PlaybackSource) -> bool {
        let _flight = self.in_flight.lock().await;

        let released = self.active.send_if_modified(|active| {
            if *active == source && source != PlaybackSource::None {
                *active = PlaybackSource::None;
                true
            } else {
                false
            }
        });

        if released {
            info!("Broker: released {}", source);
        } else {
            debug!(
                "Broker: ignoring release of {} (active is {})",
                source,
                self.active()
            );
        }
        released
    }

    /// Hold the arbitration lock while `source` is still the active one
    ///
    /// Returns `None` when another source took over. Acquisitions and
    /// releases wait until the guard drops, so work done under it cannot
    /// overlap a revoke.
    pub async fn hold(&self, source: PlaybackSource) -> Option<MutexGuard<'_, ()>> {
        let flight = self.in_flight.lock().await;
        (self.active() == source && source != PlaybackSource::None).then_some(flight)
    }

    async fn revoke(&self, source: PlaybackSource) -> RevokeResult {
        let Some(owner) = self.owners.get(&source).cloned() else {
            warn!("Broker: no owner registered for {}, granting without revoke", source);
            return RevokeResult::NotNeeded;
        };

        info!("Broker: revoking {}", source);
        let task = tokio::spawn(async move { owner.revoke().await });

        match tokio::time::timeout(self.revoke_timeout, task).await {
            Ok(Ok(Ok(()))) => RevokeResult::Completed,
            Ok(Ok(Err(e))) => {
                warn!("Broker: revoke of {} failed: {}", source, e);
                RevokeResult::Failed(e.to_string())
            }
            Ok(Err(join_err)) => {
                warn!("Broker: revoke task for {} panicked: {}", source, join_err);
                RevokeResult::Failed(join_err.to_string())
            }
            Err(_) => {
                warn!(
                    "Broker: revoke of {} not acknowledged within {:?}, proceeding",
                    source, self.revoke_timeout
                );
                RevokeResult::TimedOut
            }
        }
    }
}
