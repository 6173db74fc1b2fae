//! # RandomSecret Status
//!
//! Status reported back onto the RandomSecret after each creation attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a RandomSecret: `Unknown` until the first attempt, then
/// `Ready` or `NotReady`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SecretState {
    #[default]
    Unknown,
    Ready,
    NotReady,
}

impl fmt::Display for SecretState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::Ready => "Ready",
            Self::NotReady => "NotReady",
        };
        f.write_str(s)
    }
}

/// Status of the RandomSecret resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RandomSecretStatus {
    #[serde(default)]
    pub state: SecretState,
    /// Reason for the last transition, set when the Secret could not be created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time of the last state change (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl RandomSecretStatus {
    #[must_use]
    pub fn new(state: SecretState, message: Option<String>) -> Self {
        Self {
            state,
            message,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}
