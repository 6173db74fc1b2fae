//! Shared fixtures for integration tests
//!
//! In-memory implementations of the cluster store and the lease backend, with
//! the same compare-and-swap behaviour as the API server, plus builders for
//! the objects the controller works on.

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use random_secret_controller::constants::{
    ANNOTATION_ENABLE, ANNOTATION_KEY, ANNOTATION_LENGTH, ANNOTATION_SPECIAL_CHAR,
};
use random_secret_controller::controller::leader::{
    LeaderElectionError, LeaderElector, LeaseBackend, LeaseSettings,
};
use random_secret_controller::controller::reconciler::Reconciler;
use random_secret_controller::controller::store::{decode, ClusterStore, StoreError};
use random_secret_controller::crd::{RandomSecret, RandomSecretStatus};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// In-memory cluster store with failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<BTreeMap<Key, Secret>>,
    random_secrets: Mutex<BTreeMap<Key, DynamicObject>>,
    next_version: AtomicU64,
    pub fail_list_secrets: AtomicBool,
    pub fail_list_random_secrets: AtomicBool,
    pub fail_get_secret: AtomicBool,
    /// Secret names whose create or replace fails
    pub failing_writes: Mutex<HashSet<String>>,
    /// Secret names created by another writer just before our create lands
    pub create_conflicts: Mutex<HashSet<String>>,
    pub creates: AtomicUsize,
    pub replaces: AtomicUsize,
    pub status_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bump(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub fn insert_secret(&self, mut secret: Secret) {
        secret.metadata.resource_version = Some(self.bump());
        let k = key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(k, secret);
    }

    pub fn insert_random_secret(&self, mut obj: DynamicObject) {
        obj.metadata.resource_version = Some(self.bump());
        let k = key(
            obj.metadata.namespace.as_deref().unwrap_or_default(),
            obj.metadata.name.as_deref().unwrap_or_default(),
        );
        self.random_secrets.lock().unwrap().insert(k, obj);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn random_secret_status(&self, namespace: &str, name: &str) -> Option<RandomSecretStatus> {
        let objects = self.random_secrets.lock().unwrap();
        let obj = objects.get(&key(namespace, name))?;
        decode::<RandomSecret>(obj).ok()?.status
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    pub fn create_conflicts_for(&self, name: &str) {
        self.create_conflicts.lock().unwrap().insert(name.to_string());
    }

    fn write_fails(&self, secret: &Secret) -> bool {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        self.failing_writes.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn list_secrets(&self) -> Result<Vec<Secret>, StoreError> {
        if self.fail_list_secrets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("list secrets".to_string()));
        }
        Ok(self.secrets.lock().unwrap().values().cloned().collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        if self.fail_get_secret.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("get secret".to_string()));
        }
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        if self.write_fails(secret) {
            return Err(StoreError::Unavailable("create secret".to_string()));
        }
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        if self.create_conflicts.lock().unwrap().remove(&name) {
            self.insert_secret(Secret {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(namespace.clone()),
                    ..ObjectMeta::default()
                },
                ..Secret::default()
            });
            return Err(StoreError::AlreadyExists {
                kind: "Secret",
                namespace,
                name,
            });
        }
        let k = key(&namespace, &name);
        if self.secrets.lock().unwrap().contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: "Secret",
                namespace,
                name,
            });
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.insert_secret(secret.clone());
        Ok(())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        if self.write_fails(secret) {
            return Err(StoreError::Unavailable("replace secret".to_string()));
        }
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut secrets = self.secrets.lock().unwrap();
        let Some(current) = secrets.get_mut(&key(&namespace, &name)) else {
            return Err(StoreError::NotFound {
                kind: "Secret",
                namespace,
                name,
            });
        };
        if current.metadata.resource_version != secret.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "Secret",
                namespace,
                name,
            });
        }
        let mut updated = secret.clone();
        updated.metadata.resource_version = Some(self.bump());
        *current = updated;
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_random_secrets(&self) -> Result<Vec<DynamicObject>, StoreError> {
        if self.fail_list_random_secrets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("list random secrets".to_string()));
        }
        Ok(self.random_secrets.lock().unwrap().values().cloned().collect())
    }

    async fn update_random_secret_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RandomSecretStatus,
    ) -> Result<(), StoreError> {
        let mut objects = self.random_secrets.lock().unwrap();
        let Some(obj) = objects.get_mut(&key(namespace, name)) else {
            return Err(StoreError::NotFound {
                kind: "RandomSecret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        obj.data["status"] = serde_json::to_value(status)?;
        obj.metadata.resource_version = Some(self.bump());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory lease with resourceVersion compare-and-swap
#[derive(Debug, Default)]
pub struct MemoryLeaseBackend {
    lease: Mutex<Option<Lease>>,
    version: AtomicU64,
    pub unavailable: AtomicBool,
    /// Calls never complete while set, like an API server that stopped answering
    pub hang: AtomicBool,
}

impl MemoryLeaseBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn holder(&self) -> Option<String> {
        self.lease
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|l| l.spec.as_ref())
            .and_then(|s| s.holder_identity.clone())
    }

    async fn wait_if_hung(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn check_available(&self) -> Result<(), LeaderElectionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LeaderElectionError::Backend("lease backend unavailable".to_string()));
        }
        Ok(())
    }

    fn stamp(&self, lease: &Lease) -> Lease {
        let mut stored = lease.clone();
        stored.metadata.resource_version =
            Some((self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string());
        stored
    }
}

#[async_trait]
impl LeaseBackend for MemoryLeaseBackend {
    async fn get(&self, _name: &str) -> Result<Option<Lease>, LeaderElectionError> {
        self.wait_if_hung().await;
        self.check_available()?;
        Ok(self.lease.lock().unwrap().clone())
    }

    async fn create(&self, lease: &Lease) -> Result<bool, LeaderElectionError> {
        self.wait_if_hung().await;
        self.check_available()?;
        let mut current = self.lease.lock().unwrap();
        if current.is_some() {
            return Ok(false);
        }
        *current = Some(self.stamp(lease));
        Ok(true)
    }

    async fn replace(&self, lease: &Lease) -> Result<bool, LeaderElectionError> {
        self.wait_if_hung().await;
        self.check_available()?;
        let mut current = self.lease.lock().unwrap();
        let current_version = current
            .as_ref()
            .and_then(|l| l.metadata.resource_version.clone());
        if current_version.is_none() || current_version != lease.metadata.resource_version {
            return Ok(false);
        }
        *current = Some(self.stamp(lease));
        Ok(true)
    }
}

/// Lease settings with timings short enough for tests
pub fn fast_lease_settings(identity: &str) -> LeaseSettings {
    LeaseSettings {
        lease_name: "random-secret".to_string(),
        namespace: "default".to_string(),
        identity: identity.to_string(),
        lease_duration: Duration::from_secs(1),
        renew_interval: Duration::from_millis(100),
        retry_interval: Duration::from_millis(30),
        max_renewal_failures: 2,
    }
}

/// Elector that is always leader
pub fn standalone_elector() -> Arc<LeaderElector> {
    Arc::new(LeaderElector::standalone(fast_lease_settings("test-replica")))
}

pub fn reconciler(store: Arc<MemoryStore>) -> Reconciler {
    Reconciler::new(store, standalone_elector())
}

/// Secret carrying the given annotations and optional plain data
pub fn annotated_secret(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    data: &[(&str, &str)],
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        },
        data: (!data.is_empty()).then(|| {
            data.iter()
                .map(|(k, v)| {
                    (
                        (*k).to_string(),
                        k8s_openapi::ByteString(v.as_bytes().to_vec()),
                    )
                })
                .collect()
        }),
        ..Secret::default()
    }
}

/// Secret opted in with explicit generation parameters
pub fn managed_secret(namespace: &str, name: &str, key: &str, length: &str, special: &str) -> Secret {
    annotated_secret(
        namespace,
        name,
        &[
            (ANNOTATION_ENABLE, "true"),
            (ANNOTATION_KEY, key),
            (ANNOTATION_LENGTH, length),
            (ANNOTATION_SPECIAL_CHAR, special),
        ],
        &[],
    )
}

/// RandomSecret object as it would come back from a list call
pub fn random_secret(namespace: &str, name: &str, spec: serde_json::Value) -> DynamicObject {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "secret.a-cup-of.coffee/v1",
        "kind": "RandomSecret",
        "metadata": {"name": name, "namespace": namespace, "uid": format!("uid-{name}")},
        "spec": spec,
    }))
    .unwrap()
}

/// Decoded value stored at `key` in a Secret's data map
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()?
        .get(key)
        .map(|v| String::from_utf8(v.0.clone()).unwrap())
}
