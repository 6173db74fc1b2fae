//! # Shutdown
//!
//! Graceful shutdown coordination.
//!
//! A termination signal flips the stop flag observed by every watch dispatcher
//! and the leader elector, then the coordinator polls the in-flight sweep
//! counter a bounded number of times. The drain is best-effort: once the bound
//! is exhausted the process exits even if a sweep is still running.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Receiving half of the stop signal
///
/// Cheap to clone; every long-running task holds one.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn triggered(&mut self) {
        // Err means the coordinator is gone, which only happens on exit
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Counter of sweeps currently running
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    count: Arc<AtomicUsize>,
}

impl InFlightTracker {
    /// Mark one unit of work as started; it ends when the guard is dropped
    #[must_use]
    pub fn begin(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter on drop
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of waiting for in-flight work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No work was running when the coordinator gave up polling
    Drained,
    /// The poll budget ran out with `remaining` units still active
    TimedOut { remaining: usize },
}

/// Owns the stop signal and the in-flight counter
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    in_flight: InFlightTracker,
    drain_attempts: u32,
    poll_interval: Duration,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(drain_attempts: u32, poll_interval: Duration) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            in_flight: InFlightTracker::default(),
            drain_attempts,
            poll_interval,
        }
    }

    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> InFlightTracker {
        self.in_flight.clone()
    }

    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            info!("Shutdown requested, stopping watches");
        }
    }

    /// Poll the in-flight counter until it reaches zero or the budget runs out
    pub async fn drain(&self) -> DrainOutcome {
        for attempt in 1..=self.drain_attempts {
            let active = self.in_flight.active();
            if active == 0 {
                info!("No in-flight reconciliation, shutdown can proceed");
                return DrainOutcome::Drained;
            }
            debug!(
                attempt,
                max_attempts = self.drain_attempts,
                active,
                "Waiting for in-flight reconciliation"
            );
            tokio::time::sleep(self.poll_interval).await;
        }

        let remaining = self.in_flight.active();
        if remaining == 0 {
            DrainOutcome::Drained
        } else {
            warn!(
                remaining,
                "In-flight reconciliation still running after drain budget, exiting anyway"
            );
            DrainOutcome::TimedOut { remaining }
        }
    }
}

/// Wait for SIGTERM or SIGINT
pub async fn wait_for_termination() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
    }
    Ok(())
}
