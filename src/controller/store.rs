//! # Cluster Store
//!
//! The read/write capability the reconcile engine works against.
//!
//! [`KubeStore`] is the API server implementation. RandomSecrets are read as
//! `DynamicObject` and decoded one by one so a single malformed object cannot
//! fail a whole list call.

use crate::constants::FIELD_MANAGER;
use crate::crd::{RandomSecret, RandomSecretStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{
    Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    /// resourceVersion mismatch on write
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend unavailable (non-Kubernetes stores)
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Cluster read/write capability used by the reconcile engine
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// List Secrets in all namespaces
    async fn list_secrets(&self) -> Result<Vec<Secret>, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Create a Secret; `AlreadyExists` when the name is taken
    async fn create_secret(&self, secret: &Secret) -> Result<(), StoreError>;

    /// Replace a Secret, guarded by its resourceVersion
    async fn replace_secret(&self, secret: &Secret) -> Result<(), StoreError>;

    /// List RandomSecrets in all namespaces, undecoded
    async fn list_random_secrets(&self) -> Result<Vec<DynamicObject>, StoreError>;

    /// Read-modify-write of a RandomSecret's status
    async fn update_random_secret_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RandomSecretStatus,
    ) -> Result<(), StoreError>;
}

/// Decode a dynamic object into a typed resource
pub fn decode<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K, serde_json::Error> {
    serde_json::to_value(obj).and_then(serde_json::from_value)
}

/// API server backed store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    random_secret_resource: ApiResource,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            random_secret_resource: ApiResource::erase::<RandomSecret>(&()),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        }
    }
}

fn secret_ident(secret: &Secret) -> (String, String) {
    (
        secret.metadata.namespace.clone().unwrap_or_default(),
        secret.metadata.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn list_secrets(&self) -> Result<Vec<Secret>, StoreError> {
        let api: Api<Secret> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let (namespace, name) = secret_ident(secret);
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&Self::post_params(), secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(StoreError::AlreadyExists {
                kind: "Secret",
                namespace,
                name,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let (namespace, name) = secret_ident(secret);
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        match api.replace(&name, &Self::post_params(), secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(StoreError::Conflict {
                kind: "Secret",
                namespace,
                name,
            }),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(StoreError::NotFound {
                kind: "Secret",
                namespace,
                name,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_random_secrets(&self) -> Result<Vec<DynamicObject>, StoreError> {
        let api: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &self.random_secret_resource);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn update_random_secret_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RandomSecretStatus,
    ) -> Result<(), StoreError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.random_secret_resource);

        let Some(current) = api.get_opt(name).await? else {
            return Err(StoreError::NotFound {
                kind: "RandomSecret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        // Carrying the resourceVersion turns the merge patch into a
        // compare-and-swap against the object we just read
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": current.metadata.resource_version },
            "status": status,
        });

        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(StoreError::Conflict {
                kind: "RandomSecret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
