//! # Server Configuration
//!
//! Listener settings for the probe/metrics server and the admission webhook.

use super::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str, first_env_var};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Serve the admission webhook on this replica
    pub webhook_enabled: bool,
    /// HTTPS port for `/mutate`
    pub webhook_port: u16,
    pub webhook_tls_cert_path: PathBuf,
    pub webhook_tls_key_path: PathBuf,
    /// Service fronting the webhook; registration is skipped when unset
    pub webhook_service_name: Option<String>,
    /// Namespace of the webhook service (defaults to the controller namespace)
    pub webhook_service_namespace: Option<String>,
    /// Service port the API server calls; may differ from `webhook_port`
    pub webhook_service_port: u16,
    /// PEM bundle used as `caBundle` in the webhook registration
    pub webhook_ca_bundle_path: Option<PathBuf>,
    /// HTTP server startup timeout (seconds)
    pub startup_timeout_secs: u64,
    /// HTTP server readiness poll interval (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            webhook_enabled: true,
            webhook_port: DEFAULT_WEBHOOK_PORT,
            webhook_tls_cert_path: PathBuf::from(DEFAULT_WEBHOOK_TLS_CERT_PATH),
            webhook_tls_key_path: PathBuf::from(DEFAULT_WEBHOOK_TLS_KEY_PATH),
            webhook_service_name: None,
            webhook_service_namespace: None,
            webhook_service_port: DEFAULT_WEBHOOK_SERVICE_PORT,
            webhook_ca_bundle_path: None,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            webhook_enabled: env_var_or_default_bool("WEBHOOK_ENABLED", true),
            webhook_port: env_var_or_default("WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT),
            webhook_tls_cert_path: PathBuf::from(env_var_or_default_str(
                "WEBHOOK_TLS_CERT_PATH",
                DEFAULT_WEBHOOK_TLS_CERT_PATH,
            )),
            webhook_tls_key_path: PathBuf::from(env_var_or_default_str(
                "WEBHOOK_TLS_KEY_PATH",
                DEFAULT_WEBHOOK_TLS_KEY_PATH,
            )),
            webhook_service_name: first_env_var(&["WEBHOOK_SERVICE_NAME"]),
            webhook_service_namespace: first_env_var(&["WEBHOOK_SERVICE_NAMESPACE"]),
            webhook_service_port: env_var_or_default(
                "WEBHOOK_SERVICE_PORT",
                DEFAULT_WEBHOOK_SERVICE_PORT,
            ),
            webhook_ca_bundle_path: first_env_var(&["WEBHOOK_CA_BUNDLE_PATH"]).map(PathBuf::from),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
