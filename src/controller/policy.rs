//! # Generation Policy
//!
//! Decides whether a resource is managed and how its value is generated.
//!
//! Both the reconcile sweep and the admission webhook go through this module so
//! the two write paths can never disagree on defaults or parsing rules.
//!
//! Misconfigured annotations degrade to defaults instead of failing the object:
//!
//! | Annotation | Accepted | Fallback |
//! |------------|----------|----------|
//! | `secret.a-cup-of.coffee/enable` | exactly `true` | unmanaged |
//! | `secret.a-cup-of.coffee/key` | any non-empty string | `password` |
//! | `secret.a-cup-of.coffee/length` | decimal integer `0..=65536` | `32` |
//! | `secret.a-cup-of.coffee/special-char` | `1 t T TRUE true True 0 f F FALSE false False` | `true` |

use crate::constants::{
    ANNOTATION_ENABLE, ANNOTATION_ENABLED_VALUE, ANNOTATION_KEY, ANNOTATION_LENGTH,
    ANNOTATION_SPECIAL_CHAR, DEFAULT_SECRET_KEY, DEFAULT_SECRET_LENGTH, DEFAULT_SPECIAL_CHAR,
    MAX_SECRET_LENGTH,
};
use crate::controller::generator::{generate_with, Charset};
use crate::crd::{RandomSecretSpec, SecretLength};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::warn;

/// Outcome of evaluating a Secret's annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Not opted in; the object must not be touched
    Unmanaged,
    Managed(GenerationPolicy),
}

/// How to generate the value for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPolicy {
    /// Data key receiving the generated value
    pub key: String,
    pub length: usize,
    pub charset: Charset,
    /// Entries merged verbatim next to the generated value
    pub static_data: BTreeMap<String, String>,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            key: DEFAULT_SECRET_KEY.to_string(),
            length: DEFAULT_SECRET_LENGTH,
            charset: Charset::from_special(DEFAULT_SPECIAL_CHAR),
            static_data: BTreeMap::new(),
        }
    }
}

/// True iff the enable annotation is present and exactly `"true"`
#[must_use]
pub fn is_managed(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_ENABLE))
        .is_some_and(|v| v == ANNOTATION_ENABLED_VALUE)
}

/// Evaluate a Secret's metadata
#[must_use]
pub fn evaluate(meta: &ObjectMeta) -> PolicyDecision {
    if !is_managed(meta) {
        return PolicyDecision::Unmanaged;
    }
    let empty = BTreeMap::new();
    let annotations = meta.annotations.as_ref().unwrap_or(&empty);
    PolicyDecision::Managed(GenerationPolicy::from_annotations(annotations, meta))
}

impl GenerationPolicy {
    /// Build the policy from Secret annotations
    ///
    /// `meta` is only used to name the object in fallback warnings.
    #[must_use]
    pub fn from_annotations(annotations: &BTreeMap<String, String>, meta: &ObjectMeta) -> Self {
        let key = annotations
            .get(ANNOTATION_KEY)
            .map(|k| k.as_str().trim())
            .filter(|k| !k.is_empty())
            .map_or_else(|| DEFAULT_SECRET_KEY.to_string(), ToString::to_string);

        let length = match annotations.get(ANNOTATION_LENGTH) {
            None => DEFAULT_SECRET_LENGTH,
            Some(raw) => parse_length(raw).unwrap_or_else(|| {
                warn!(
                    namespace = meta.namespace.as_deref().unwrap_or_default(),
                    name = meta.name.as_deref().unwrap_or_default(),
                    value = %raw,
                    "Invalid length annotation, using default {}",
                    DEFAULT_SECRET_LENGTH
                );
                DEFAULT_SECRET_LENGTH
            }),
        };

        let include_special = match annotations.get(ANNOTATION_SPECIAL_CHAR) {
            None => DEFAULT_SPECIAL_CHAR,
            Some(raw) => parse_flag(raw).unwrap_or_else(|| {
                warn!(
                    namespace = meta.namespace.as_deref().unwrap_or_default(),
                    name = meta.name.as_deref().unwrap_or_default(),
                    value = %raw,
                    "Invalid special-char annotation, using default {}",
                    DEFAULT_SPECIAL_CHAR
                );
                DEFAULT_SPECIAL_CHAR
            }),
        };

        Self {
            key,
            length,
            charset: Charset::from_special(include_special),
            static_data: BTreeMap::new(),
        }
    }

    /// Build the policy from a RandomSecret spec
    #[must_use]
    pub fn from_spec(spec: &RandomSecretSpec) -> Self {
        let key = match spec.key.trim() {
            "" => DEFAULT_SECRET_KEY.to_string(),
            k => k.to_string(),
        };

        let length = spec
            .length
            .as_ref()
            .map_or(DEFAULT_SECRET_LENGTH, |raw| {
                resolve_length(raw).unwrap_or_else(|| {
                    warn!(
                        secret = %spec.secret_name,
                        value = %raw,
                        "Invalid spec.length, using default {}",
                        DEFAULT_SECRET_LENGTH
                    );
                    DEFAULT_SECRET_LENGTH
                })
            });

        let mut static_data = spec.static_data.clone();
        if static_data.remove(&key).is_some() {
            warn!(
                secret = %spec.secret_name,
                key = %key,
                "spec.static contains the generated key, ignoring the static entry"
            );
        }

        Self {
            key,
            length,
            charset: Charset::from_special(spec.special_char),
            static_data,
        }
    }

    /// Produce a fresh value for this policy
    #[must_use]
    pub fn generate(&self) -> String {
        generate_with(self.length, self.charset)
    }

    /// Whether the Secret already holds a non-empty value at the target key
    ///
    /// Once true for a key it stays true; the value is never regenerated.
    #[must_use]
    pub fn is_handled(&self, secret: &Secret) -> bool {
        let in_data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(&self.key))
            .is_some_and(|v| !v.0.is_empty());
        let in_string_data = secret
            .string_data
            .as_ref()
            .and_then(|d| d.get(&self.key))
            .is_some_and(|v| !v.is_empty());
        in_data || in_string_data
    }
}

/// Parse a length annotation value
///
/// Returns `None` for anything that is not a decimal integer within
/// `0..=MAX_SECRET_LENGTH`.
#[must_use]
pub fn parse_length(raw: &str) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n <= MAX_SECRET_LENGTH)
}

fn resolve_length(raw: &SecretLength) -> Option<usize> {
    match raw {
        SecretLength::Number(n) => usize::try_from(*n)
            .ok()
            .filter(|n| *n <= MAX_SECRET_LENGTH),
        SecretLength::Text(s) => parse_length(s),
        SecretLength::Other(_) => None,
    }
}

/// Parse a boolean annotation value using the usual `1/t/true/0/f/false` spellings
#[must_use]
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;

    fn meta(annotations: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some("app".to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        }
    }

    fn managed(annotations: &[(&str, &str)]) -> GenerationPolicy {
        match evaluate(&meta(annotations)) {
            PolicyDecision::Managed(policy) => policy,
            PolicyDecision::Unmanaged => panic!("Expected a managed decision"),
        }
    }

    #[test]
    fn test_enable_requires_exact_literal() {
        assert!(is_managed(&meta(&[(ANNOTATION_ENABLE, "true")])));
        for value in ["True", "TRUE", "yes", "1", "", " true"] {
            assert!(
                !is_managed(&meta(&[(ANNOTATION_ENABLE, value)])),
                "{value:?} must not enable management"
            );
        }
        assert!(!is_managed(&ObjectMeta::default()));
        assert_eq!(evaluate(&meta(&[])), PolicyDecision::Unmanaged);
    }

    #[test]
    fn test_defaults_when_only_enabled() {
        let policy = managed(&[(ANNOTATION_ENABLE, "true")]);
        assert_eq!(policy, GenerationPolicy::default());
        assert_eq!(policy.key, "password");
        assert_eq!(policy.length, 32);
        assert_eq!(policy.charset, Charset::AlphanumericWithSpecial);
    }

    #[test]
    fn test_explicit_annotations() {
        let policy = managed(&[
            (ANNOTATION_ENABLE, "true"),
            (ANNOTATION_KEY, "token"),
            (ANNOTATION_LENGTH, "16"),
            (ANNOTATION_SPECIAL_CHAR, "false"),
        ]);
        assert_eq!(policy.key, "token");
        assert_eq!(policy.length, 16);
        assert_eq!(policy.charset, Charset::Alphanumeric);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let policy = managed(&[
            (ANNOTATION_ENABLE, "true"),
            (ANNOTATION_KEY, "  "),
            (ANNOTATION_LENGTH, "sixteen"),
            (ANNOTATION_SPECIAL_CHAR, "nope"),
        ]);
        assert_eq!(policy, GenerationPolicy::default());
    }

    #[test]
    fn test_parse_length_bounds() {
        assert_eq!(parse_length("0"), Some(0));
        assert_eq!(parse_length(" 24 "), Some(24));
        assert_eq!(parse_length("-1"), None);
        assert_eq!(parse_length("65537"), None);
        assert_eq!(parse_length("1e3"), None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("T"), Some(true));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag("yes"), None);
    }

    #[test]
    fn test_from_spec() {
        let spec: RandomSecretSpec = serde_json::from_value(serde_json::json!({
            "secretName": "s1",
            "key": "pw",
            "length": "10",
            "specialChar": false,
            "static": {"username": "app", "pw": "ignored"}
        }))
        .unwrap();
        let policy = GenerationPolicy::from_spec(&spec);
        assert_eq!(policy.key, "pw");
        assert_eq!(policy.length, 10);
        assert_eq!(policy.charset, Charset::Alphanumeric);
        assert_eq!(policy.static_data.len(), 1);
        assert!(!policy.static_data.contains_key("pw"));
    }

    #[test]
    fn test_from_spec_invalid_length() {
        for length in [serde_json::json!("abc"), serde_json::json!(-3), serde_json::json!(1.5)] {
            let spec: RandomSecretSpec = serde_json::from_value(serde_json::json!({
                "secretName": "s1", "length": length
            }))
            .unwrap();
            assert_eq!(GenerationPolicy::from_spec(&spec).length, DEFAULT_SECRET_LENGTH);
        }
    }

    #[test]
    fn test_is_handled() {
        let policy = GenerationPolicy::default();
        let mut secret = Secret::default();
        assert!(!policy.is_handled(&secret));

        secret.data = Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(Vec::new()),
        )]));
        assert!(!policy.is_handled(&secret), "Empty values are regenerated");

        secret.data = Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(b"x".to_vec()),
        )]));
        assert!(policy.is_handled(&secret));

        let secret = Secret {
            string_data: Some(BTreeMap::from([("password".to_string(), "y".to_string())])),
            ..Secret::default()
        };
        assert!(policy.is_handled(&secret));
    }

    #[test]
    fn test_generate_matches_policy() {
        let policy = managed(&[
            (ANNOTATION_ENABLE, "true"),
            (ANNOTATION_LENGTH, "16"),
            (ANNOTATION_SPECIAL_CHAR, "false"),
        ]);
        let value = policy.generate();
        assert_eq!(value.len(), 16);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
