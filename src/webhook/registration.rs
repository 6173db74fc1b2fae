//! # Webhook Registration
//!
//! Server-side applies the `MutatingWebhookConfiguration` pointing the API
//! server at this controller's `/mutate` endpoint.
//!
//! The rule matches `CREATE` only. Updates never reach the webhook, so a value
//! a user later clears is restored by the sweep rather than at admission.

use crate::config::ServerConfig;
use crate::constants::{
    FIELD_MANAGER, WEBHOOK_CONFIGURATION_NAME, WEBHOOK_NAME, WEBHOOK_PATH,
    WEBHOOK_TIMEOUT_SECS,
};
use anyhow::{Context, Result};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Build the webhook configuration for a service
pub fn build_webhook_configuration(
    service_name: &str,
    service_namespace: &str,
    service_port: u16,
    ca_bundle: Option<Vec<u8>>,
) -> MutatingWebhookConfiguration {
    let webhook = MutatingWebhook {
        name: WEBHOOK_NAME.to_string(),
        admission_review_versions: vec!["v1".to_string()],
        side_effects: "None".to_string(),
        // Ignore: a webhook outage must not block Secret creation; the sweep catches up
        failure_policy: Some("Ignore".to_string()),
        match_policy: Some("Equivalent".to_string()),
        reinvocation_policy: Some("Never".to_string()),
        timeout_seconds: Some(WEBHOOK_TIMEOUT_SECS),
        rules: Some(vec![RuleWithOperations {
            api_groups: Some(vec![String::new()]),
            api_versions: Some(vec!["v1".to_string()]),
            operations: Some(vec!["CREATE".to_string()]),
            resources: Some(vec!["secrets".to_string()]),
            scope: Some("Namespaced".to_string()),
        }]),
        client_config: WebhookClientConfig {
            ca_bundle: ca_bundle.map(ByteString),
            service: Some(ServiceReference {
                name: service_name.to_string(),
                namespace: service_namespace.to_string(),
                path: Some(WEBHOOK_PATH.to_string()),
                port: Some(i32::from(service_port)),
            }),
            url: None,
        },
        ..MutatingWebhook::default()
    };

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_CONFIGURATION_NAME.to_string()),
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/managed-by".to_string(),
                FIELD_MANAGER.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        webhooks: Some(vec![webhook]),
    }
}

/// Apply the webhook configuration when a service is configured
///
/// Returns `false` when registration was skipped.
pub async fn ensure_webhook_config(
    client: Client,
    config: &ServerConfig,
    controller_namespace: &str,
) -> Result<bool> {
    let Some(service_name) = config.webhook_service_name.as_deref() else {
        warn!("WEBHOOK_SERVICE_NAME not set, skipping webhook registration");
        return Ok(false);
    };
    let service_namespace = config
        .webhook_service_namespace
        .as_deref()
        .unwrap_or(controller_namespace);

    let ca_bundle = match &config.webhook_ca_bundle_path {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read CA bundle {}", path.display()))?,
        ),
        None => None,
    };

    let webhook_config = build_webhook_configuration(
        service_name,
        service_namespace,
        config.webhook_service_port,
        ca_bundle,
    );
    let api: Api<MutatingWebhookConfiguration> = Api::all(client);
    api.patch(
        WEBHOOK_CONFIGURATION_NAME,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&webhook_config),
    )
    .await
    .context("Failed to apply MutatingWebhookConfiguration")?;

    info!(
        name = WEBHOOK_CONFIGURATION_NAME,
        service = %service_name,
        namespace = %service_namespace,
        "Applied MutatingWebhookConfiguration"
    );
    Ok(true)
}
