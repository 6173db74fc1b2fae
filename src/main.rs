//! # Random Secret Controller
//!
//! Entry point: initializes the runtime, starts leader election and one watch
//! dispatcher per resource kind, then waits for SIGTERM/SIGINT.
//!
//! ## Shutdown
//!
//! On a termination signal readiness flips to false, the stop signal fires,
//! in-flight sweeps get a bounded drain, and the lease is released so another
//! replica can take over without waiting for expiry.

use anyhow::{bail, Result};
use random_secret_controller::controller::reconciler::ResourceKind;
use random_secret_controller::runtime::initialization::{initialize, InitializationResult};
use random_secret_controller::runtime::shutdown::{wait_for_termination, DrainOutcome};
use random_secret_controller::runtime::watch_loop::WatchDispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let InitializationResult {
        client,
        controller_config,
        reconciler,
        elector,
        coordinator,
        server_state,
        webhook_handle,
        ..
    } = initialize().await?;

    let elector_handle = tokio::spawn(Arc::clone(&elector).run(coordinator.signal()));

    let mut dispatchers = JoinSet::new();
    for kind in [ResourceKind::Secret, ResourceKind::RandomSecret] {
        let dispatcher = WatchDispatcher::new(
            kind,
            Arc::clone(&reconciler),
            &coordinator,
            &controller_config,
        );
        let client = client.clone();
        dispatchers.spawn(async move { dispatcher.run(client).await });
    }

    let mut failed = false;
    tokio::select! {
        result = wait_for_termination() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to wait for termination signals");
                failed = true;
            }
        }
        Some(joined) = dispatchers.join_next() => {
            match joined {
                Ok(Ok(())) => error!("Watch dispatcher exited before shutdown"),
                Ok(Err(e)) => error!(error = %e, "Watch dispatcher failed"),
                Err(e) => error!(error = %e, "Watch dispatcher panicked"),
            }
            failed = true;
        }
    }

    server_state.set_ready(false);
    coordinator.trigger();

    if let DrainOutcome::TimedOut { remaining } = coordinator.drain().await {
        warn!(remaining, "Exiting with sweeps still in flight");
    }

    // The elector releases the lease once it observes the stop signal
    match tokio::time::timeout(controller_config.lease_renew_interval(), elector_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Leader election task panicked"),
        Err(_) => warn!("Timed out waiting for the lease to be released"),
    }
    if let Some(handle) = webhook_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Timed out waiting for the admission webhook to stop");
        }
    }
    dispatchers.abort_all();

    if failed {
        bail!("Controller stopped after an unrecoverable error");
    }
    info!("Controller stopped gracefully");
    Ok(())
}
