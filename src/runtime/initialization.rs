//! # Initialization
//!
//! Controller startup: rustls setup, configuration, tracing, metrics, probe
//! server, Kubernetes client, leader election, and the admission webhook.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::leader::LeaderElector;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::KubeStore;
use crate::observability;
use crate::runtime::shutdown::ShutdownCoordinator;
use crate::webhook;
use anyhow::{anyhow, Context, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the main loop needs once startup has succeeded
pub struct InitializationResult {
    pub client: Client,
    pub controller_config: ControllerConfig,
    pub server_config: ServerConfig,
    pub reconciler: Arc<Reconciler>,
    pub elector: Arc<LeaderElector>,
    pub coordinator: ShutdownCoordinator,
    /// Probe state; readiness is flipped off at shutdown
    pub server_state: Arc<ServerState>,
    /// Admission webhook task, when enabled
    pub webhook_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("identity", &self.elector.identity())
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// Any error returned here is fatal: the process has no safe partially
/// initialized state to continue in.
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected by features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let controller_config = ControllerConfig::from_env();
    let server_config = ServerConfig::from_env();

    init_tracing(&controller_config.log_format);

    info!("Starting Random Secret Controller");
    info!(
        timestamp = env!("BUILD_TIMESTAMP"),
        datetime = env!("BUILD_DATETIME"),
        git_hash = env!("BUILD_GIT_HASH"),
        "Build info"
    );

    controller_config
        .validate()
        .context("Invalid controller configuration")?;

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let metrics_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(metrics_port, server_state_clone).await {
            error!(error = %e, "HTTP server error");
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let elector = Arc::new(LeaderElector::from_config(client.clone(), &controller_config));
    elector
        .verify_access()
        .await
        .context("Cannot read the leader election lease")?;
    info!(
        identity = %elector.identity(),
        namespace = %controller_config.namespace,
        lease = %controller_config.lease_name,
        "Leader election configured"
    );

    let store = Arc::new(KubeStore::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(store, Arc::clone(&elector)));

    let coordinator = ShutdownCoordinator::new(
        controller_config.shutdown_drain_attempts,
        controller_config.shutdown_poll_interval(),
    );

    let webhook_handle = if server_config.webhook_enabled {
        if let Err(e) = webhook::registration::ensure_webhook_config(
            client.clone(),
            &server_config,
            &controller_config.namespace,
        )
        .await
        {
            // Secrets are still filled by the sweep without the webhook
            warn!(error = %e, "Webhook registration failed, continuing with sweeps only");
        }

        let webhook_config = server_config.clone();
        let signal = coordinator.signal();
        Some(tokio::spawn(async move {
            if let Err(e) = webhook::serve(&webhook_config, signal).await {
                error!(error = %e, "Admission webhook stopped");
            }
        }))
    } else {
        info!("Admission webhook disabled");
        None
    };

    server_state.set_ready(true);
    info!("Controller initialized, starting watches...");

    Ok(InitializationResult {
        client,
        controller_config,
        server_config,
        reconciler,
        elector,
        coordinator,
        server_state,
        webhook_handle,
    })
}

/// Install the tracing subscriber
///
/// `LOG_FORMAT=text` selects human-readable output, anything else JSON.
fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "random_secret_controller=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if log_format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Wait for the HTTP server to bind its listener
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_serving.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
