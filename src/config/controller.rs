//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str, first_env_var};
use anyhow::{ensure, Result};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from the deployment (downward API for
/// `POD_NAME` / `POD_NAMESPACE`).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding the leader election lease
    pub namespace: String,
    /// Holder identity written into the lease
    pub identity: String,
    /// When false the controller assumes it is the only replica
    pub leader_election_enabled: bool,
    /// Lease object name
    pub lease_name: String,
    /// How long a lease stays valid without renewal (seconds)
    pub lease_duration_secs: u64,
    /// How often the holder renews the lease (seconds)
    pub lease_renew_interval_secs: u64,
    /// How often a non-holder retries acquisition (seconds)
    pub lease_retry_interval_secs: u64,
    /// Consecutive renewal failures before leadership is dropped
    pub lease_max_renewal_failures: u32,
    /// Debounce window for coalescing watch events into one sweep (milliseconds)
    pub sweep_debounce_ms: u64,
    /// Delay applied after unclassified watch stream errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Number of in-flight polls during shutdown
    pub shutdown_drain_attempts: u32,
    /// Interval between in-flight polls during shutdown (milliseconds)
    pub shutdown_poll_interval_ms: u64,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            identity: generated_identity(),
            leader_election_enabled: true,
            lease_name: DEFAULT_LEASE_NAME.to_string(),
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
            lease_renew_interval_secs: DEFAULT_LEASE_RENEW_INTERVAL_SECS,
            lease_retry_interval_secs: DEFAULT_LEASE_RETRY_INTERVAL_SECS,
            lease_max_renewal_failures: DEFAULT_LEASE_MAX_RENEWAL_FAILURES,
            sweep_debounce_ms: DEFAULT_SWEEP_DEBOUNCE_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            shutdown_drain_attempts: DEFAULT_SHUTDOWN_DRAIN_ATTEMPTS,
            shutdown_poll_interval_ms: DEFAULT_SHUTDOWN_POLL_INTERVAL_MS,
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            namespace: first_env_var(&["POD_NAMESPACE", "NAMESPACE"])
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            identity: first_env_var(&["POD_NAME", "HOSTNAME"]).unwrap_or_else(generated_identity),
            leader_election_enabled: env_var_or_default_bool("LEADER_ELECTION_ENABLED", true),
            lease_name: env_var_or_default_str("LEASE_NAME", DEFAULT_LEASE_NAME),
            lease_duration_secs: env_var_or_default(
                "LEASE_DURATION_SECS",
                DEFAULT_LEASE_DURATION_SECS,
            ),
            lease_renew_interval_secs: env_var_or_default(
                "LEASE_RENEW_INTERVAL_SECS",
                DEFAULT_LEASE_RENEW_INTERVAL_SECS,
            ),
            lease_retry_interval_secs: env_var_or_default(
                "LEASE_RETRY_INTERVAL_SECS",
                DEFAULT_LEASE_RETRY_INTERVAL_SECS,
            ),
            lease_max_renewal_failures: env_var_or_default(
                "LEASE_MAX_RENEWAL_FAILURES",
                DEFAULT_LEASE_MAX_RENEWAL_FAILURES,
            ),
            sweep_debounce_ms: env_var_or_default("SWEEP_DEBOUNCE_MS", DEFAULT_SWEEP_DEBOUNCE_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            shutdown_drain_attempts: env_var_or_default(
                "SHUTDOWN_DRAIN_ATTEMPTS",
                DEFAULT_SHUTDOWN_DRAIN_ATTEMPTS,
            ),
            shutdown_poll_interval_ms: env_var_or_default(
                "SHUTDOWN_POLL_INTERVAL_MS",
                DEFAULT_SHUTDOWN_POLL_INTERVAL_MS,
            ),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    /// Reject timing combinations that would let a healthy leader lose its lease
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.identity.is_empty(), "holder identity must not be empty");
        ensure!(!self.lease_name.is_empty(), "lease name must not be empty");
        ensure!(
            self.lease_duration_secs > 0,
            "LEASE_DURATION_SECS must be greater than zero"
        );
        ensure!(
            self.lease_renew_interval_secs > 0,
            "LEASE_RENEW_INTERVAL_SECS must be greater than zero"
        );
        ensure!(
            self.lease_retry_interval_secs > 0,
            "LEASE_RETRY_INTERVAL_SECS must be greater than zero"
        );
        ensure!(
            self.lease_renew_interval_secs < self.lease_duration_secs,
            "LEASE_RENEW_INTERVAL_SECS ({}) must be less than LEASE_DURATION_SECS ({})",
            self.lease_renew_interval_secs,
            self.lease_duration_secs
        );
        ensure!(
            self.lease_max_renewal_failures > 0,
            "LEASE_MAX_RENEWAL_FAILURES must be greater than zero"
        );
        Ok(())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn lease_renew_interval(&self) -> Duration {
        Duration::from_secs(self.lease_renew_interval_secs)
    }

    pub fn lease_retry_interval(&self) -> Duration {
        Duration::from_secs(self.lease_retry_interval_secs)
    }

    /// Get sweep debounce duration
    pub fn sweep_debounce(&self) -> Duration {
        Duration::from_millis(self.sweep_debounce_ms)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }
}

fn generated_identity() -> String {
    format!("random-secret-controller-{}", uuid::Uuid::new_v4())
}
