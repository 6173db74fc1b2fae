//! # RandomSecret Sweep
//!
//! Creates the Secret requested by each RandomSecret when it does not exist
//! yet and reports the outcome in the RandomSecret's status.

use super::types::{Reconciler, ReconcilerError, ResourceKind, SweepReport};
use crate::constants::{FIELD_MANAGER, MANAGED_BY_LABEL};
use crate::controller::policy::GenerationPolicy;
use crate::controller::store::{decode, StoreError};
use crate::crd::{RandomSecret, RandomSecretStatus, SecretState};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl Reconciler {
    pub(super) async fn sweep_random_secrets(&self) -> Result<SweepReport, ReconcilerError> {
        let objects = self
            .store
            .list_random_secrets()
            .await
            .map_err(|source| ReconcilerError::List {
                kind: ResourceKind::RandomSecret,
                source,
            })?;

        let mut report = SweepReport::default();
        let mut leadership_warned = false;

        for obj in objects {
            report.listed += 1;
            let namespace = obj.metadata.namespace.clone().unwrap_or_default();
            let name = obj.metadata.name.clone().unwrap_or_default();

            let resource: RandomSecret = match decode(&obj) {
                Ok(resource) => resource,
                Err(e) => {
                    report.invalid += 1;
                    warn!(
                        namespace = %namespace,
                        name = %name,
                        error = %e,
                        "Skipping malformed RandomSecret"
                    );
                    continue;
                }
            };
            if namespace.is_empty() || name.is_empty() || resource.spec.secret_name.trim().is_empty() {
                report.invalid += 1;
                warn!(
                    namespace = %namespace,
                    name = %name,
                    "Skipping RandomSecret without namespace, name or spec.secretName"
                );
                continue;
            }
            report.managed += 1;

            self.note_leadership(&mut leadership_warned);
            self.reconcile_random_secret(&resource, &namespace, &name, &mut report)
                .await;
        }

        Ok(report)
    }

    async fn reconcile_random_secret(
        &self,
        resource: &RandomSecret,
        namespace: &str,
        name: &str,
        report: &mut SweepReport,
    ) {
        let secret_name = resource.spec.secret_name.trim();
        let current_state = resource
            .status
            .as_ref()
            .map(|s| s.state)
            .unwrap_or_default();

        let existing = match self.store.get_secret(namespace, secret_name).await {
            Ok(existing) => existing,
            Err(e) => {
                report.failed += 1;
                metrics::increment_write_failures(ResourceKind::RandomSecret.as_str());
                warn!(
                    namespace = %namespace,
                    name = %name,
                    secret = %secret_name,
                    error = %e,
                    "Failed to check target Secret, will retry on the next sweep"
                );
                return;
            }
        };

        if existing.is_some() {
            report.already_handled += 1;
            debug!(namespace = %namespace, name = %name, secret = %secret_name, "Target Secret already exists");
            if current_state != SecretState::Ready {
                let status = RandomSecretStatus::new(SecretState::Ready, None);
                self.write_status(namespace, name, &status, report).await;
            }
            return;
        }

        let policy = GenerationPolicy::from_spec(&resource.spec);
        let secret = build_secret(namespace, secret_name, &policy, policy.generate());

        let status = match self.store.create_secret(&secret).await {
            Ok(()) => {
                report.generated += 1;
                metrics::increment_values_generated("reconcile");
                info!(
                    namespace = %namespace,
                    name = %name,
                    secret = %secret_name,
                    key = %policy.key,
                    length = policy.length,
                    "Created Secret for RandomSecret"
                );
                RandomSecretStatus::new(SecretState::Ready, None)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                report.already_handled += 1;
                debug!(
                    namespace = %namespace,
                    secret = %secret_name,
                    "Target Secret appeared concurrently"
                );
                RandomSecretStatus::new(SecretState::Ready, None)
            }
            Err(e) => {
                report.failed += 1;
                metrics::increment_write_failures(ResourceKind::RandomSecret.as_str());
                warn!(
                    namespace = %namespace,
                    name = %name,
                    secret = %secret_name,
                    error = %e,
                    "Failed to create Secret for RandomSecret"
                );
                RandomSecretStatus::new(
                    SecretState::NotReady,
                    Some(format!("failed to create Secret {secret_name}: {e}")),
                )
            }
        };

        self.write_status(namespace, name, &status, report).await;
    }

    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RandomSecretStatus,
        report: &mut SweepReport,
    ) {
        if let Err(e) = self
            .store
            .update_random_secret_status(namespace, name, status)
            .await
        {
            report.status_failures += 1;
            warn!(
                namespace = %namespace,
                name = %name,
                state = %status.state,
                error = %e,
                "Failed to update RandomSecret status"
            );
        } else {
            debug!(namespace = %namespace, name = %name, state = %status.state, "RandomSecret status updated");
        }
    }
}

/// Secret requested by a RandomSecret: generated value plus static entries
fn build_secret(namespace: &str, name: &str, policy: &GenerationPolicy, value: String) -> Secret {
    let mut data: BTreeMap<String, ByteString> = policy
        .static_data
        .iter()
        .map(|(k, v)| (k.clone(), ByteString(v.clone().into_bytes())))
        .collect();
    data.insert(policy.key.clone(), ByteString(value.into_bytes()));

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                FIELD_MANAGER.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    }
}
