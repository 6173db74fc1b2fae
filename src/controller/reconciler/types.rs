//! # Types
//!
//! Core types for the reconciler.

use crate::controller::leader::LeaderElector;
use crate::controller::store::{ClusterStore, StoreError};
use crate::observability::metrics;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, Instrument};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Sweeps only run on the leader
    #[error("not the leader, sweep skipped")]
    NotLeader,
    /// Listing failed; the sweep was aborted and retried on the next trigger
    #[error("failed to list {kind} resources: {source}")]
    List {
        kind: ResourceKind,
        #[source]
        source: StoreError,
    },
}

/// Resource kinds reconciled by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Annotated core Secrets
    Secret,
    /// RandomSecret custom resources
    RandomSecret,
}

impl ResourceKind {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::RandomSecret => "RandomSecret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a sweep was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    /// First sweep after gaining leadership
    Startup,
    /// Coalesced watch events
    WatchEvent,
}

impl SweepTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepTrigger::Startup => "startup",
            SweepTrigger::WatchEvent => "watch-event",
        }
    }
}

/// Counters collected during one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Objects returned by the list call
    pub listed: usize,
    /// Objects that are opted in
    pub managed: usize,
    /// Managed objects that needed no write
    pub already_handled: usize,
    /// Values generated and written
    pub generated: usize,
    /// Per-object write failures
    pub failed: usize,
    /// RandomSecret status writes that failed
    pub status_failures: usize,
    /// Objects that could not be decoded or were missing required fields
    pub invalid: usize,
}

/// Reconcile engine
///
/// Holds the store it writes through and the elector gating every sweep.
#[derive(Clone)]
pub struct Reconciler {
    pub(super) store: Arc<dyn ClusterStore>,
    pub(super) leader: Arc<LeaderElector>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("leader", &self.leader)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>, leader: Arc<LeaderElector>) -> Self {
        Self { store, leader }
    }

    #[must_use]
    pub fn leader(&self) -> &Arc<LeaderElector> {
        &self.leader
    }

    /// Run one full sweep of `kind`
    ///
    /// Leadership is checked once, up front. A sweep that has started runs to
    /// completion even if leadership is lost midway; every write it performs is
    /// individually guarded by the "already handled" check.
    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        trigger: SweepTrigger,
    ) -> Result<SweepReport, ReconcilerError> {
        if !self.leader.is_leader() {
            return Err(ReconcilerError::NotLeader);
        }

        let span = tracing::info_span!(
            "reconcile.sweep",
            kind = kind.as_str(),
            trigger = trigger.as_str()
        );

        async move {
            let start = Instant::now();
            metrics::increment_sweeps(kind.as_str());

            let result = match kind {
                ResourceKind::Secret => self.sweep_secrets().await,
                ResourceKind::RandomSecret => self.sweep_random_secrets().await,
            };
            metrics::observe_sweep_duration(kind.as_str(), start.elapsed().as_secs_f64());

            match &result {
                Ok(report) => info!(
                    listed = report.listed,
                    managed = report.managed,
                    already_handled = report.already_handled,
                    generated = report.generated,
                    failed = report.failed,
                    status_failures = report.status_failures,
                    invalid = report.invalid,
                    duration_ms = start.elapsed().as_millis(),
                    "Sweep completed"
                ),
                Err(e) => {
                    metrics::increment_sweep_errors(kind.as_str());
                    error!(error = %e, "Sweep aborted");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Note (once per sweep) that a write happens after leadership was lost
    pub(super) fn note_leadership(&self, warned: &mut bool) {
        if !*warned && !self.leader.is_leader() {
            *warned = true;
            tracing::warn!("Leadership lost mid-sweep, finishing the current sweep");
        }
    }
}
