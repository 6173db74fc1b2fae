//! # Error Policy
//!
//! Classification of watch stream errors.
//!
//! The watcher already retries with backoff; this module decides how loudly to
//! report an error and whether to pause before the next attempt.

use crate::controller::reconciler::ResourceKind;
use std::time::Duration;
use tracing::{error, warn};

/// Coarse category of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resourceVersion too old, the watcher relists
    Expired,
    /// 429: API server storage reinitializing or throttling
    Throttled,
    /// 404: CRD missing or resource deleted
    NotFound,
    Other,
}

impl WatchErrorClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Expired => "expired",
            Self::Throttled => "throttled",
            Self::NotFound => "not-found",
            Self::Other => "other",
        }
    }
}

/// Classify a watch error from its debug rendering
///
/// 404 is checked before 401: a plain-text 404 body surfaces as a decode error
/// whose chain may also mention the failed watch.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorClass::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorClass::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorClass::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorClass::Throttled;
    }
    WatchErrorClass::Other
}

/// Log a watch stream error and wait when the class calls for it
///
/// The stream itself is never torn down here.
pub async fn handle_watch_stream_error(
    kind: ResourceKind,
    error_string: &str,
    restart_delay: Duration,
) -> WatchErrorClass {
    let class = classify_watch_error(error_string);
    match class {
        WatchErrorClass::Unauthorized => {
            error!(
                kind = %kind,
                error = %error_string,
                "Watch authentication failed (401), check the controller's ClusterRole and binding"
            );
            // RBAC changes take a moment to propagate
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorClass::Expired => {
            warn!(kind = %kind, "Watch resource version expired (410), relisting");
        }
        WatchErrorClass::Throttled => {
            warn!(kind = %kind, error = %error_string, "API server throttling watch (429), backing off");
        }
        WatchErrorClass::NotFound => {
            warn!(
                kind = %kind,
                error = %error_string,
                "Watched resource not found (404), is the RandomSecret CRD installed?"
            );
        }
        WatchErrorClass::Other => {
            error!(kind = %kind, error = %error_string, "Watch stream error");
        }
    }
    class
}
