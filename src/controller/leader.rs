//! # Leader Election
//!
//! Leader election over a `coordination.k8s.io/v1` Lease so that only one
//! replica runs reconciliation sweeps at a time. The admission webhook is not
//! gated and runs on every replica.
//!
//! # Atomicity
//!
//! Every lease write carries the resourceVersion that was read. If the lease
//! changed in between, the write fails with 409 Conflict and the attempt counts
//! as lost, never as an error. Two replicas can therefore never both believe
//! they acquired the same lease generation.
//!
//! # Losing leadership
//!
//! The holder renews every `renew_interval`. A renewal that observes another
//! holder drops leadership at once. Renewal errors are tolerated until either
//! `max_renewal_failures` consecutive failures are reached or the next renewal
//! would land after the lease expires, whichever comes first. A renewal call
//! still pending when the lease expires also drops leadership. A sweep already
//! running is not interrupted; only new sweeps wait for leadership again.

use crate::config::ControllerConfig;
use crate::observability::metrics;
use crate::runtime::shutdown::ShutdownSignal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("lease {0} is missing resourceVersion")]
    MissingResourceVersion(String),
    /// Non-Kubernetes backend failure
    #[error("lease backend error: {0}")]
    Backend(String),
}

/// Read/write access to the single lease object
///
/// Writes are compare-and-swap on `metadata.resourceVersion`: `Ok(false)`
/// means another writer got there first.
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Lease>, LeaderElectionError>;

    /// Create the lease; `Ok(false)` if it already exists
    async fn create(&self, lease: &Lease) -> Result<bool, LeaderElectionError>;

    /// Replace the lease; `Ok(false)` on resourceVersion conflict
    async fn replace(&self, lease: &Lease) -> Result<bool, LeaderElectionError>;
}

/// Lease backend talking to the API server
#[derive(Clone)]
pub struct KubeLeaseBackend {
    api: Api<Lease>,
}

impl std::fmt::Debug for KubeLeaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeLeaseBackend").finish_non_exhaustive()
    }
}

impl KubeLeaseBackend {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl LeaseBackend for KubeLeaseBackend {
    async fn get(&self, name: &str) -> Result<Option<Lease>, LeaderElectionError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, lease: &Lease) -> Result<bool, LeaderElectionError> {
        let params = PostParams {
            field_manager: Some(crate::constants::FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        match self.api.create(&params, lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace(&self, lease: &Lease) -> Result<bool, LeaderElectionError> {
        let name = lease.metadata.name.as_deref().unwrap_or_default();
        let params = PostParams {
            field_manager: Some(crate::constants::FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        match self.api.replace(name, &params, lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Lease timings and identity
#[derive(Debug, Clone)]
pub struct LeaseSettings {
    pub lease_name: String,
    pub namespace: String,
    pub identity: String,
    pub lease_duration: Duration,
    pub renew_interval: Duration,
    pub retry_interval: Duration,
    pub max_renewal_failures: u32,
}

impl From<&ControllerConfig> for LeaseSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            lease_name: config.lease_name.clone(),
            namespace: config.namespace.clone(),
            identity: config.identity.clone(),
            lease_duration: config.lease_duration(),
            renew_interval: config.lease_renew_interval(),
            retry_interval: config.lease_retry_interval(),
            max_renewal_failures: config.lease_max_renewal_failures,
        }
    }
}

enum HoldOutcome {
    Lost,
    Shutdown,
}

/// Leader elector
///
/// `is_leader()` never blocks; `await_leadership()` resolves as soon as the
/// background election loop (started with [`LeaderElector::run`]) holds the lease.
pub struct LeaderElector {
    backend: Option<Arc<dyn LeaseBackend>>,
    settings: LeaseSettings,
    state: watch::Sender<bool>,
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("identity", &self.settings.identity)
            .field("lease", &self.settings.lease_name)
            .field("is_leader", &self.is_leader())
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    /// Create an elector contending for the lease through `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn LeaseBackend>, settings: LeaseSettings) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            backend: Some(backend),
            settings,
            state,
        }
    }

    /// Create an elector that is always leader (leader election disabled)
    #[must_use]
    pub fn standalone(settings: LeaseSettings) -> Self {
        let (state, _) = watch::channel(true);
        metrics::set_is_leader(true);
        Self {
            backend: None,
            settings,
            state,
        }
    }

    /// Build the elector described by the controller configuration
    #[must_use]
    pub fn from_config(client: Client, config: &ControllerConfig) -> Self {
        let settings = LeaseSettings::from(config);
        if config.leader_election_enabled {
            let backend = Arc::new(KubeLeaseBackend::new(client, &settings.namespace));
            Self::new(backend, settings)
        } else {
            info!("Leader election disabled, running as the only active replica");
            Self::standalone(settings)
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.settings.identity
    }

    /// Current leadership, without blocking
    #[must_use]
    pub fn is_leader(&self) -> bool {
        *self.state.borrow()
    }

    /// Subscribe to leadership changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Resolve once this replica holds the lease
    pub async fn await_leadership(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|leader| *leader).await;
    }

    /// Check that the lease can be read at all
    ///
    /// Called once at startup; a failure here is fatal because no replica
    /// could ever coordinate writes safely.
    pub async fn verify_access(&self) -> Result<(), LeaderElectionError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        match backend.get(&self.settings.lease_name).await? {
            Some(lease) => {
                let holder = lease.spec.and_then(|s| s.holder_identity);
                info!(
                    lease = %self.settings.lease_name,
                    namespace = %self.settings.namespace,
                    holder = holder.as_deref().unwrap_or("<none>"),
                    "Lease is reachable"
                );
            }
            None => info!(
                lease = %self.settings.lease_name,
                namespace = %self.settings.namespace,
                "Lease does not exist yet, it will be created on acquisition"
            ),
        }
        Ok(())
    }

    /// Block until the lease is held or shutdown is requested
    ///
    /// Returns false when interrupted by shutdown.
    pub async fn acquire(&self, shutdown: &mut ShutdownSignal) -> bool {
        if self.backend.is_none() {
            return true;
        }

        info!(
            identity = %self.settings.identity,
            lease = %self.settings.lease_name,
            "Waiting for leadership..."
        );

        loop {
            let attempt = tokio::select! {
                () = shutdown.triggered() => return false,
                attempt = self.try_acquire_or_renew() => attempt,
            };
            match attempt {
                Ok(true) => {
                    info!(identity = %self.settings.identity, "Leadership acquired");
                    self.set_leader(true);
                    return true;
                }
                Ok(false) => {
                    debug!(
                        identity = %self.settings.identity,
                        retry_secs = self.settings.retry_interval.as_secs(),
                        "Lease held by another replica, waiting..."
                    );
                }
                Err(e) => {
                    warn!(
                        identity = %self.settings.identity,
                        error = %e,
                        retry_secs = self.settings.retry_interval.as_secs(),
                        "Failed to acquire lease, retrying..."
                    );
                }
            }
            tokio::select! {
                () = shutdown.triggered() => return false,
                () = tokio::time::sleep(self.settings.retry_interval) => {}
            }
        }
    }

    /// Election loop: acquire, renew until lost, repeat; release on shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        if self.backend.is_none() {
            shutdown.triggered().await;
            return;
        }

        loop {
            if !self.acquire(&mut shutdown).await {
                break;
            }
            match self.hold(&mut shutdown).await {
                HoldOutcome::Lost => {}
                HoldOutcome::Shutdown => break,
            }
        }

        if self.is_leader() {
            if let Err(e) = self.release().await {
                warn!(identity = %self.settings.identity, error = %e, "Failed to release lease");
            }
        }
        self.set_leader(false);
        info!(identity = %self.settings.identity, "Leader election stopped");
    }

    /// Renew the lease until leadership is lost or shutdown is requested
    async fn hold(&self, shutdown: &mut ShutdownSignal) -> HoldOutcome {
        let mut failures = 0u32;
        let mut last_renewed = Instant::now();

        loop {
            tokio::select! {
                () = shutdown.triggered() => return HoldOutcome::Shutdown,
                () = tokio::time::sleep(self.settings.renew_interval) => {}
            }

            // A renewal may not outlive the lease it is renewing
            let attempt_started = Instant::now();
            let remaining = self
                .settings
                .lease_duration
                .saturating_sub(last_renewed.elapsed());
            let Ok(attempt) = tokio::time::timeout(remaining, self.try_acquire_or_renew()).await
            else {
                error!(
                    identity = %self.settings.identity,
                    "Lease renewal did not complete before the lease expired, leadership lost"
                );
                self.set_leader(false);
                return HoldOutcome::Lost;
            };

            match attempt {
                Ok(true) => {
                    failures = 0;
                    last_renewed = attempt_started;
                }
                Ok(false) => {
                    warn!(identity = %self.settings.identity, "Lease taken by another replica, leadership lost");
                    self.set_leader(false);
                    return HoldOutcome::Lost;
                }
                Err(e) => {
                    failures += 1;
                    let expires_before_next_renewal = last_renewed.elapsed()
                        + self.settings.renew_interval
                        >= self.settings.lease_duration;
                    warn!(
                        identity = %self.settings.identity,
                        error = %e,
                        failures,
                        max_failures = self.settings.max_renewal_failures,
                        "Lease renewal failed"
                    );
                    if failures >= self.settings.max_renewal_failures || expires_before_next_renewal {
                        error!(
                            identity = %self.settings.identity,
                            failures,
                            "Giving up leadership after failed renewals"
                        );
                        self.set_leader(false);
                        return HoldOutcome::Lost;
                    }
                }
            }
        }
    }

    /// Try to acquire or renew the lease atomically
    ///
    /// - Read the lease and its resourceVersion
    /// - Decide if we can acquire/renew
    /// - Write with that resourceVersion; a conflict means someone else won
    pub async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let Some(backend) = &self.backend else {
            return Ok(true);
        };
        let now = Utc::now();

        let Some(lease) = backend.get(&self.settings.lease_name).await? else {
            return self.create_lease(backend.as_ref(), now).await;
        };

        let spec = lease.spec.as_ref();
        let holder = spec
            .and_then(|s| s.holder_identity.as_deref())
            .filter(|h| !h.is_empty());

        if holder == Some(self.settings.identity.as_str()) {
            let mut renewed = lease.clone();
            if let Some(spec) = renewed.spec.as_mut() {
                spec.renew_time = Some(MicroTime(now));
                spec.lease_duration_seconds = Some(self.lease_duration_secs());
            }
            self.require_resource_version(&renewed)?;
            let ok = backend.replace(&renewed).await?;
            if ok {
                debug!(identity = %self.settings.identity, "Lease renewed");
            }
            return Ok(ok);
        }

        let renew_time = spec.and_then(|s| s.renew_time.as_ref());
        let duration_secs = spec.and_then(|s| s.lease_duration_seconds);
        let is_expired = match (holder, renew_time, duration_secs) {
            (None, _, _) => true,
            (Some(_), Some(rt), Some(duration)) => rt
                .0
                .checked_add_signed(chrono::Duration::seconds(i64::from(duration)))
                .is_none_or(|expires_at| now > expires_at),
            _ => true,
        };
        if !is_expired {
            return Ok(false);
        }

        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
        let taken = Lease {
            metadata: ObjectMeta {
                name: Some(self.settings.lease_name.clone()),
                namespace: Some(self.settings.namespace.clone()),
                resource_version: lease.metadata.resource_version.clone(),
                ..ObjectMeta::default()
            },
            spec: Some(self.lease_spec(now, transitions + 1)),
        };
        self.require_resource_version(&taken)?;
        let ok = backend.replace(&taken).await?;
        if ok {
            info!(
                identity = %self.settings.identity,
                previous_holder = holder.unwrap_or("<none>"),
                transitions = transitions + 1,
                "Took over expired lease"
            );
        } else {
            debug!(identity = %self.settings.identity, "Lease takeover conflict, will retry");
        }
        Ok(ok)
    }

    /// Release the lease by clearing the holder identity
    ///
    /// Another replica can acquire it immediately instead of waiting for expiry.
    pub async fn release(&self) -> Result<(), LeaderElectionError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        self.set_leader(false);

        let Some(lease) = backend.get(&self.settings.lease_name).await? else {
            debug!(identity = %self.settings.identity, "Lease not found, nothing to release");
            return Ok(());
        };
        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.settings.identity.as_str()) {
            debug!(identity = %self.settings.identity, "Not the lease holder, nothing to release");
            return Ok(());
        }

        let mut released = lease.clone();
        if let Some(spec) = released.spec.as_mut() {
            spec.holder_identity = None;
            let renew_time = Utc::now()
                .checked_sub_signed(chrono::Duration::seconds(60))
                .unwrap_or_else(Utc::now);
            spec.renew_time = Some(MicroTime(renew_time));
        }
        self.require_resource_version(&released)?;
        if backend.replace(&released).await? {
            info!(identity = %self.settings.identity, "Lease released for fast failover");
        } else {
            debug!(identity = %self.settings.identity, "Lease changed before release");
        }
        Ok(())
    }

    async fn create_lease(
        &self,
        backend: &dyn LeaseBackend,
        now: DateTime<Utc>,
    ) -> Result<bool, LeaderElectionError> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.settings.lease_name.clone()),
                namespace: Some(self.settings.namespace.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(self.lease_spec(now, 0)),
        };
        let created = backend.create(&lease).await?;
        if created {
            info!(identity = %self.settings.identity, "Created new lease");
        } else {
            debug!(identity = %self.settings.identity, "Lease creation conflict, will retry");
        }
        Ok(created)
    }

    fn lease_spec(&self, now: DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.settings.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration_secs()),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..LeaseSpec::default()
        }
    }

    /// Lease duration as written into the lease, rounded up to whole seconds
    fn lease_duration_secs(&self) -> i32 {
        let duration = self.settings.lease_duration;
        let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        i32::try_from(secs.max(1)).unwrap_or(i32::MAX)
    }

    fn require_resource_version(&self, lease: &Lease) -> Result<(), LeaderElectionError> {
        if lease.metadata.resource_version.is_none() {
            return Err(LeaderElectionError::MissingResourceVersion(
                self.settings.lease_name.clone(),
            ));
        }
        Ok(())
    }

    fn set_leader(&self, leader: bool) {
        if self.state.send_replace(leader) != leader {
            metrics::set_is_leader(leader);
        }
    }
}
