//! # Secret Sweep
//!
//! Writes generated values into annotated Secrets that lack one.

use super::types::{Reconciler, ReconcilerError, ResourceKind, SweepReport};
use crate::controller::policy::{self, PolicyDecision};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl Reconciler {
    pub(super) async fn sweep_secrets(&self) -> Result<SweepReport, ReconcilerError> {
        let secrets = self
            .store
            .list_secrets()
            .await
            .map_err(|source| ReconcilerError::List {
                kind: ResourceKind::Secret,
                source,
            })?;

        let mut report = SweepReport::default();
        let mut leadership_warned = false;

        for secret in secrets {
            report.listed += 1;
            let PolicyDecision::Managed(policy) = policy::evaluate(&secret.metadata) else {
                continue;
            };
            report.managed += 1;

            let namespace = secret.metadata.namespace.clone().unwrap_or_default();
            let name = secret.metadata.name.clone().unwrap_or_default();

            if policy.is_handled(&secret) {
                report.already_handled += 1;
                debug!(namespace = %namespace, name = %name, key = %policy.key, "Secret already handled");
                continue;
            }

            self.note_leadership(&mut leadership_warned);

            let updated = with_generated_value(secret, &policy.key, policy.generate());
            match self.store.replace_secret(&updated).await {
                Ok(()) => {
                    report.generated += 1;
                    metrics::increment_values_generated("reconcile");
                    info!(
                        namespace = %namespace,
                        name = %name,
                        key = %policy.key,
                        length = policy.length,
                        "Generated value for Secret"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::increment_write_failures(ResourceKind::Secret.as_str());
                    warn!(
                        namespace = %namespace,
                        name = %name,
                        error = %e,
                        "Failed to update Secret, will retry on the next sweep"
                    );
                }
            }
        }

        Ok(report)
    }
}

/// Insert `value` under `key`, keeping every other entry
fn with_generated_value(mut secret: Secret, key: &str, value: String) -> Secret {
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), ByteString(value.into_bytes()));
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_generated_value_keeps_existing_entries() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                "username".to_string(),
                ByteString(b"app".to_vec()),
            )])),
            ..Secret::default()
        };
        let updated = with_generated_value(secret, "password", "s3cr3t".to_string());
        let data = updated.data.unwrap();
        assert_eq!(data["username"].0, b"app".to_vec());
        assert_eq!(data["password"].0, b"s3cr3t".to_vec());
    }

    #[test]
    fn test_with_generated_value_creates_data_map() {
        let updated = with_generated_value(Secret::default(), "token", "x".to_string());
        assert_eq!(updated.data.unwrap().len(), 1);
    }
}
