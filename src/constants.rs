//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Annotation that opts a Secret in; must equal [`ANNOTATION_ENABLED_VALUE`]
pub const ANNOTATION_ENABLE: &str = "secret.a-cup-of.coffee/enable";

/// Annotation naming the data key that receives the generated value
pub const ANNOTATION_KEY: &str = "secret.a-cup-of.coffee/key";

/// Annotation holding the generated value length
pub const ANNOTATION_LENGTH: &str = "secret.a-cup-of.coffee/length";

/// Annotation toggling punctuation characters in the generated value
pub const ANNOTATION_SPECIAL_CHAR: &str = "secret.a-cup-of.coffee/special-char";

/// The only value of [`ANNOTATION_ENABLE`] that marks a Secret as managed
pub const ANNOTATION_ENABLED_VALUE: &str = "true";

/// Default data key for generated values
pub const DEFAULT_SECRET_KEY: &str = "password";

/// Default generated value length
pub const DEFAULT_SECRET_LENGTH: usize = 32;

/// Upper bound for a requested length (64KB, same as the Secret size guard)
pub const MAX_SECRET_LENGTH: usize = 65_536;

/// Default for the special character flag
pub const DEFAULT_SPECIAL_CHAR: bool = true;

/// Alphanumeric charset (62 characters)
pub const ALPHANUMERIC_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Punctuation appended to the charset when special characters are enabled
pub const SPECIAL_CHARSET: &[u8] = b"!@#$%^&*()-_=+[]{}|;:,.<>?/~`";

/// Label stamped on Secrets created from a RandomSecret
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Field manager / label value used for every write
pub const FIELD_MANAGER: &str = "random-secret-controller";

/// Default lease name used for leader election
pub const DEFAULT_LEASE_NAME: &str = "random-secret";

/// Default namespace for the lease when none is provided by the environment
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default lease duration (seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default lease renew interval (seconds)
/// Must stay below the lease duration
pub const DEFAULT_LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Default interval between acquisition attempts (seconds)
pub const DEFAULT_LEASE_RETRY_INTERVAL_SECS: u64 = 2;

/// Consecutive renewal failures tolerated before leadership is dropped
pub const DEFAULT_LEASE_MAX_RENEWAL_FAILURES: u32 = 2;

/// Default debounce window that coalesces watch events into one sweep (milliseconds)
pub const DEFAULT_SWEEP_DEBOUNCE_MS: u64 = 500;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default number of in-flight polls during shutdown
pub const DEFAULT_SHUTDOWN_DRAIN_ATTEMPTS: u32 = 10;

/// Default interval between in-flight polls during shutdown (milliseconds)
pub const DEFAULT_SHUTDOWN_POLL_INTERVAL_MS: u64 = 1000;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTPS port for the admission webhook
pub const DEFAULT_WEBHOOK_PORT: u16 = 443;

/// Default port of the Service fronting the webhook, as registered with the API server
pub const DEFAULT_WEBHOOK_SERVICE_PORT: u16 = 443;

/// Default webhook certificate path
pub const DEFAULT_WEBHOOK_TLS_CERT_PATH: &str = "/certs/tls.crt";

/// Default webhook private key path
pub const DEFAULT_WEBHOOK_TLS_KEY_PATH: &str = "/certs/tls.key";

/// Name of the MutatingWebhookConfiguration managed at startup
pub const WEBHOOK_CONFIGURATION_NAME: &str = "random-secret-controller";

/// Name of the single webhook inside the configuration
pub const WEBHOOK_NAME: &str = "mutate.secret.a-cup-of.coffee";

/// Path served by the admission handler
pub const WEBHOOK_PATH: &str = "/mutate";

/// Admission webhook timeout registered with the API server (seconds)
pub const WEBHOOK_TIMEOUT_SECS: i32 = 5;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
