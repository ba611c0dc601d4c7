//! Refresh controller: fetch → render → attach, serialized.
//!
//! The controller owns the pipeline from feed bytes to attached layer
//! group. Its contract:
//!
//! - at most one fetch in flight per controller;
//! - a refresh requested while one is in flight is coalesced into
//!   "run once more after the current completes";
//! - last-request-wins: an in-flight result that has been superseded
//!   by a queued request is discarded, never attached, so a slow first
//!   fetch can never clobber a faster second one;
//! - stale-while-revalidate: the previously attached group stays
//!   visible during a fetch, and a failed refresh never removes
//!   already-visible data.
//!
//! # State machine
//!
//! ```text
//! Idle ──► Fetching ──► Rendering ──► (attached) ──► Idle
//!             │                            │
//!             └────── failed (keep old) ◄──┘
//! ```

use crate::config::LayerConfig;
use crate::feature::{self, FeatureError};
use crate::feed::{FeedClient, FeedError};
use crate::layer::LayerGroup;
use crate::render::render_collection;
use crate::surface::MapSession;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that can fail one refresh cycle.
///
/// Both variants are cycle-local: the controller logs them, keeps the
/// previously attached group, and returns to idle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RefreshError {
    /// The feed fetch failed.
    #[error("feed fetch failed: {0}")]
    Fetch(#[from] FeedError),

    /// The payload was not a feature collection.
    #[error("feed parse failed: {0}")]
    Parse(#[from] FeatureError),
}

/// Where the controller currently is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// No refresh in flight; the last attached group stays visible.
    Idle,
    /// Fetch issued; the visible group is untouched.
    Fetching,
    /// Payload received; the new group is being built off-surface.
    Rendering,
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new group was attached.
    Attached {
        /// Generation stamped on the attached group.
        generation: u64,
        /// Layers in the attached group.
        rendered: usize,
        /// Feed records excluded: parse skips plus render diagnostics.
        skipped: usize,
    },
    /// Another refresh was in flight; this request was queued into its
    /// follow-up run.
    Coalesced,
}

/// Counters for monitoring refresh behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStats {
    /// Refresh requests received.
    pub triggers: u64,
    /// Cycles that attached a new group.
    pub completed: u64,
    /// Requests queued behind an in-flight cycle.
    pub coalesced: u64,
    /// In-flight results discarded because a newer request superseded
    /// them.
    pub superseded: u64,
    /// Cycles that failed (fetch or parse).
    pub failed: u64,
}

struct ControllerState {
    phase: RefreshPhase,
    busy: bool,
    pending: bool,
}

enum CycleOutcome {
    Attached {
        generation: u64,
        rendered: usize,
        skipped: usize,
    },
    /// Result discarded because a newer request arrived mid-cycle.
    Superseded,
}

/// Serializes the fetch → render → attach pipeline for one map session.
pub struct RefreshController<C: FeedClient> {
    client: C,
    config: LayerConfig,
    session: Arc<MapSession>,
    state: Mutex<ControllerState>,
    stats: Mutex<RefreshStats>,
    generation: AtomicU64,
}

impl<C: FeedClient> RefreshController<C> {
    pub fn new(client: C, config: LayerConfig, session: Arc<MapSession>) -> Self {
        Self {
            client,
            config,
            session,
            state: Mutex::new(ControllerState {
                phase: RefreshPhase::Idle,
                busy: false,
                pending: false,
            }),
            stats: Mutex::new(RefreshStats::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Requests a refresh.
    ///
    /// If no refresh is in flight, runs the full cycle (plus any
    /// follow-up runs queued while it was busy) and returns the final
    /// attach result. If a refresh is already in flight, queues one
    /// follow-up run and returns [`RefreshOutcome::Coalesced`]
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns the last cycle's error when fetch or parse failed and no
    /// follow-up was queued. The previously attached group is always
    /// left untouched on error.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        {
            let mut state = self.state.lock().await;
            self.stats.lock().await.triggers += 1;
            if state.busy {
                state.pending = true;
                self.stats.lock().await.coalesced += 1;
                return Ok(RefreshOutcome::Coalesced);
            }
            state.busy = true;
        }

        let mut result = self.run_to_completion().await;

        // Consume any follow-up queued between the last pending check
        // and the busy reset, so a coalesced request is never lost.
        loop {
            let mut state = self.state.lock().await;
            if state.pending {
                state.pending = false;
                drop(state);
                result = self.run_to_completion().await;
                continue;
            }
            state.busy = false;
            state.phase = RefreshPhase::Idle;
            break;
        }
        result
    }

    /// Runs cycles until no follow-up request is pending.
    async fn run_to_completion(&self) -> Result<RefreshOutcome, RefreshError> {
        loop {
            let cycle = self.run_cycle().await;

            let mut state = self.state.lock().await;
            if state.pending {
                state.pending = false;
                drop(state);
                continue;
            }
            drop(state);

            return match cycle {
                Ok(CycleOutcome::Attached {
                    generation,
                    rendered,
                    skipped,
                }) => Ok(RefreshOutcome::Attached {
                    generation,
                    rendered,
                    skipped,
                }),
                // Superseded implies a pending follow-up, which the
                // loop above consumes before we get here.
                Ok(CycleOutcome::Superseded) => unreachable!("superseded cycle without pending"),
                Err(e) => Err(e),
            };
        }
    }

    /// Runs one fetch → render → attach cycle.
    async fn run_cycle(&self) -> Result<CycleOutcome, RefreshError> {
        self.set_phase(RefreshPhase::Fetching).await;

        let bytes = match self.client.fetch().await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.lock().await.failed += 1;
                warn!(error = %e, "refresh fetch failed, retaining previously attached group");
                return Err(e.into());
            }
        };

        // The payload is stale the moment a newer request is queued;
        // skip rendering it.
        if self.pending().await {
            self.stats.lock().await.superseded += 1;
            return Ok(CycleOutcome::Superseded);
        }

        self.set_phase(RefreshPhase::Rendering).await;

        let parsed = match feature::parse_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.lock().await.failed += 1;
                warn!(error = %e, "refresh parse failed, retaining previously attached group");
                return Err(e.into());
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = render_collection(&parsed.collection, &self.config, generation);
        let rendered = outcome.rendered_count();
        let skipped = parsed.skipped_count() + outcome.diagnostic_count();

        // Final supersession check before the swap becomes observable.
        if self.pending().await {
            self.stats.lock().await.superseded += 1;
            return Ok(CycleOutcome::Superseded);
        }

        self.session.swap(Arc::new(outcome.group)).await;
        self.stats.lock().await.completed += 1;
        info!(
            generation = generation,
            rendered = rendered,
            skipped = skipped,
            "attached refreshed layer group"
        );

        Ok(CycleOutcome::Attached {
            generation,
            rendered,
            skipped,
        })
    }

    /// Runs the polling loop until the token is cancelled.
    ///
    /// The first tick fires immediately, so the map is populated as
    /// soon as the loop starts. Cycle failures are logged and the loop
    /// keeps going; the last good group stays attached throughout.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("refresh loop shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "scheduled refresh failed");
                    }
                }
            }
        }
    }

    /// Returns the current state-machine phase.
    pub async fn phase(&self) -> RefreshPhase {
        self.state.lock().await.phase
    }

    /// Returns a snapshot of the refresh counters.
    pub async fn stats(&self) -> RefreshStats {
        self.stats.lock().await.clone()
    }

    /// Returns the session this controller attaches groups to.
    pub fn session(&self) -> &Arc<MapSession> {
        &self.session
    }

    /// Returns the currently attached group, if any.
    pub async fn attached(&self) -> Option<Arc<LayerGroup>> {
        self.session.attached().await
    }

    async fn set_phase(&self, phase: RefreshPhase) {
        self.state.lock().await.phase = phase;
    }

    async fn pending(&self) -> bool {
        self.state.lock().await.pending
    }
}
