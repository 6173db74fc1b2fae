//! # RandomSecret Spec
//!
//! Declarative request for a Secret holding one generated value.

use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// RandomSecret Custom Resource Definition
///
/// Asks the controller to create the Secret `secretName` in the same namespace,
/// holding a generated value under `key` plus any `static` entries. The Secret is
/// only created when it does not exist yet; an existing Secret is never touched.
///
/// # Example
///
/// ```yaml
/// apiVersion: secret.a-cup-of.coffee/v1
/// kind: RandomSecret
/// metadata:
///   name: database
///   namespace: default
/// spec:
///   secretName: database-credentials
///   key: password
///   length: 24
///   specialChar: false
///   static:
///     username: app
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "RandomSecret",
    group = "secret.a-cup-of.coffee",
    version = "v1",
    namespaced,
    status = "crate::crd::RandomSecretStatus",
    shortname = "rs",
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".spec.secretName"}, {"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RandomSecretSpec {
    /// Name of the Secret to create in the resource's namespace
    pub secret_name: String,
    /// Data key receiving the generated value
    /// Default: "password"
    #[serde(default = "default_key")]
    pub key: String,
    /// Generated value length
    /// Accepts an integer or a numeric string; anything else falls back to 32
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "secret_length_schema")]
    pub length: Option<SecretLength>,
    /// Include punctuation characters in the generated value
    /// Default: true
    #[serde(default = "default_true")]
    pub special_char: bool,
    /// Entries copied verbatim into the created Secret
    #[serde(default, rename = "static", skip_serializing_if = "BTreeMap::is_empty")]
    pub static_data: BTreeMap<String, String>,
}

/// Raw `spec.length` value
///
/// Kept loose on purpose so that a mistyped length never makes the whole
/// object undecodable; interpretation happens in the generation policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SecretLength {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl fmt::Display for SecretLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<usize> for SecretLength {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Text(value.to_string()), Self::Number)
    }
}

impl From<&str> for SecretLength {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

fn secret_length_schema(_gen: &mut SchemaGenerator) -> Schema {
    // int-or-string keeps the schema structural while still admitting "24"
    let schema_value = serde_json::json!({
        "x-kubernetes-int-or-string": true,
        "anyOf": [{"type": "integer"}, {"type": "string"}],
        "nullable": true,
        "description": "Generated value length. Integer or numeric string; invalid values fall back to 32."
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for SecretLength")
}

/// Default data key
#[must_use]
pub fn default_key() -> String {
    crate::constants::DEFAULT_SECRET_KEY.to_string()
}

/// Default value for boolean fields that should be true
#[must_use]
pub fn default_true() -> bool {
    true
}
