//! Cluster registry: tenant cluster CRUD, connection probes, activation.
//!
//! Kubeconfigs are encrypted before they reach the store and decrypted only
//! for the probe that needs them. Validated connection handles are cached
//! per cluster under a stable fingerprint of the exact configuration they
//! were built from, so a changed kubeconfig can never be served stale.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::cluster::{CreateClusterRequest, UpdateClusterRequest};
use crate::models::{Cluster, ConnectionTestResult};
use crate::services::connector::ClusterConnector;
use crate::services::error::ServiceError;
use crate::services::store::AuthStore;
use crate::services::vault::SecretVault;

/// Validated connection state for one cluster configuration.
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    /// Fingerprint of the configuration this handle was validated against.
    pub fingerprint: String,
    pub version: Option<String>,
    pub validated_utc: DateTime<Utc>,
}

/// Per-process cache of validated cluster handles, keyed by cluster id.
///
/// Every entry carries the fingerprint of the exact configuration it was
/// built from; a lookup under any other fingerprint drops the entry instead
/// of serving it. Update and delete evict eagerly on top of that.
#[derive(Clone, Default)]
pub struct ClientCache {
    handles: Arc<DashMap<Uuid, ClusterHandle>>,
}

impl ClientCache {
    pub fn get(&self, cluster_id: Uuid, fingerprint: &str) -> Option<ClusterHandle> {
        let stale = match self.handles.get(&cluster_id) {
            Some(entry) if entry.fingerprint == fingerprint => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            // Built from an older configuration; it must not be served again.
            self.handles.remove(&cluster_id);
        }
        None
    }

    pub fn store(&self, cluster_id: Uuid, handle: ClusterHandle) {
        self.handles.insert(cluster_id, handle);
    }

    pub fn evict(&self, cluster_id: Uuid) {
        self.handles.remove(&cluster_id);
    }
}

/// Stable fingerprint of a decrypted configuration. Identical across
/// restarts, unlike a hasher seeded per process.
fn config_fingerprint(kubeconfig: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kubeconfig.as_bytes());
    hasher.update(context.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct ClusterService {
    store: Arc<dyn AuthStore>,
    vault: SecretVault,
    connector: Arc<dyn ClusterConnector>,
    clients: ClientCache,
}

impl ClusterService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        vault: SecretVault,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        Self {
            store,
            vault,
            connector,
            clients: ClientCache::default(),
        }
    }

    /// Register a cluster, encrypting its kubeconfig before it is persisted.
    #[tracing::instrument(skip(self, req))]
    pub async fn create(
        &self,
        owner_id: Uuid,
        req: CreateClusterRequest,
    ) -> Result<Cluster, ServiceError> {
        // Cluster names are unique per owner
        if self
            .store
            .find_cluster_by_owner_and_name(owner_id, &req.name)
            .await
            .map_err(ServiceError::Database)?
            .is_some()
        {
            return Err(ServiceError::DuplicateClusterName(req.name));
        }

        let encrypted = self.vault.encrypt(&req.kubeconfig)?;

        let cluster = Cluster::new(
            owner_id,
            req.name,
            req.description,
            encrypted,
            req.context.unwrap_or_default(),
            req.tags.unwrap_or_default(),
        );

        self.store
            .insert_cluster(&cluster)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(
            cluster_id = %cluster.cluster_id,
            owner_id = %owner_id,
            name = %cluster.name,
            "Cluster registered"
        );

        Ok(cluster)
    }

    /// List the caller's clusters.
    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<Cluster>, ServiceError> {
        self.store
            .find_clusters_by_owner(owner_id)
            .await
            .map_err(ServiceError::Database)
    }

    /// Fetch one cluster, enforcing ownership.
    pub async fn get(&self, owner_id: Uuid, cluster_id: Uuid) -> Result<Cluster, ServiceError> {
        self.load_owned(owner_id, cluster_id).await
    }

    /// Apply a partial update. A new kubeconfig is re-encrypted; activation
    /// requests go through the same exclusive path as `activate` so one
    /// owner never ends up with two active clusters.
    #[tracing::instrument(skip(self, req))]
    pub async fn update(
        &self,
        owner_id: Uuid,
        cluster_id: Uuid,
        req: UpdateClusterRequest,
    ) -> Result<Cluster, ServiceError> {
        let mut cluster = self.load_owned(owner_id, cluster_id).await?;

        if let Some(name) = req.name {
            if name != cluster.name {
                let taken = self
                    .store
                    .find_cluster_by_owner_and_name(owner_id, &name)
                    .await
                    .map_err(ServiceError::Database)?
                    .is_some();
                if taken {
                    return Err(ServiceError::DuplicateClusterName(name));
                }
                cluster.name = name;
            }
        }
        if let Some(description) = req.description {
            cluster.description = Some(description);
        }
        if let Some(kubeconfig) = req.kubeconfig {
            cluster.kubeconfig_encrypted = self.vault.encrypt(&kubeconfig)?;
        }
        if let Some(context) = req.context {
            cluster.context = context;
        }
        if let Some(tags) = req.tags {
            cluster.tags = tags;
        }
        if req.is_active == Some(false) {
            cluster.is_active = false;
        }
        cluster.updated_utc = Utc::now();

        self.store
            .update_cluster(&cluster)
            .await
            .map_err(ServiceError::Database)?;

        if req.is_active == Some(true) {
            self.store
                .activate_cluster(owner_id, cluster_id)
                .await
                .map_err(ServiceError::Database)?;
            cluster = self
                .store
                .find_cluster_by_id(cluster_id)
                .await
                .map_err(ServiceError::Database)?
                .ok_or(ServiceError::ClusterNotFound)?;
        }

        // The stored configuration may have changed under the handle
        self.clients.evict(cluster_id);

        tracing::info!(cluster_id = %cluster_id, owner_id = %owner_id, "Cluster updated");

        Ok(cluster)
    }

    /// Delete a cluster and evict its cached handle.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, owner_id: Uuid, cluster_id: Uuid) -> Result<(), ServiceError> {
        self.load_owned(owner_id, cluster_id).await?;

        self.store
            .delete_cluster(cluster_id)
            .await
            .map_err(ServiceError::Database)?;

        self.clients.evict(cluster_id);

        tracing::info!(cluster_id = %cluster_id, owner_id = %owner_id, "Cluster deleted");

        Ok(())
    }

    /// Probe the cluster's API server and persist the outcome.
    ///
    /// The kubeconfig is decrypted for this probe only. Unreadable
    /// credentials count as a failed probe, not a server error.
    #[tracing::instrument(skip(self))]
    pub async fn test_connection(
        &self,
        owner_id: Uuid,
        cluster_id: Uuid,
    ) -> Result<ConnectionTestResult, ServiceError> {
        let cluster = self.load_owned(owner_id, cluster_id).await?;

        let kubeconfig = match self.vault.decrypt(&cluster.kubeconfig_encrypted) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                tracing::warn!(cluster_id = %cluster_id, "Stored kubeconfig failed decryption");
                self.clients.evict(cluster_id);
                self.store
                    .record_cluster_probe(cluster_id, false, None)
                    .await
                    .map_err(ServiceError::Database)?;
                return Ok(ConnectionTestResult::unreachable(
                    "Failed to decrypt kubeconfig",
                ));
            }
        };

        let fingerprint = config_fingerprint(&kubeconfig, &cluster.context);
        // A handle under this exact fingerprint means the cluster was
        // reachable before; losing it is a regression worth flagging.
        let previously_validated = self.clients.get(cluster_id, &fingerprint).is_some();

        let result = self.connector.probe(&kubeconfig, &cluster.context).await;
        drop(kubeconfig); // plaintext is single-use

        if result.connected {
            self.clients.store(
                cluster_id,
                ClusterHandle {
                    fingerprint,
                    version: result.version.clone(),
                    validated_utc: Utc::now(),
                },
            );
            tracing::info!(
                cluster_id = %cluster_id,
                version = ?result.version,
                "Cluster probe succeeded"
            );
        } else {
            self.clients.evict(cluster_id);
            if previously_validated {
                tracing::warn!(
                    cluster_id = %cluster_id,
                    error = ?result.error,
                    "Previously reachable cluster failed its probe"
                );
            } else {
                tracing::info!(
                    cluster_id = %cluster_id,
                    error = ?result.error,
                    "Cluster probe failed"
                );
            }
        }

        self.store
            .record_cluster_probe(cluster_id, result.connected, result.version.clone())
            .await
            .map_err(ServiceError::Database)?;

        Ok(result)
    }

    /// Make this the owner's single active cluster.
    #[tracing::instrument(skip(self))]
    pub async fn activate(
        &self,
        owner_id: Uuid,
        cluster_id: Uuid,
    ) -> Result<Cluster, ServiceError> {
        self.load_owned(owner_id, cluster_id).await?;

        self.store
            .activate_cluster(owner_id, cluster_id)
            .await
            .map_err(ServiceError::Database)?;

        let cluster = self
            .store
            .find_cluster_by_id(cluster_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::ClusterNotFound)?;

        tracing::info!(cluster_id = %cluster_id, owner_id = %owner_id, "Cluster activated");

        Ok(cluster)
    }

    /// Load a cluster and enforce ownership. Missing id beats foreign owner.
    async fn load_owned(
        &self,
        owner_id: Uuid,
        cluster_id: Uuid,
    ) -> Result<Cluster, ServiceError> {
        let cluster = self
            .store
            .find_cluster_by_id(cluster_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::ClusterNotFound)?;

        if cluster.owner_id != owner_id {
            return Err(ServiceError::NotOwner);
        }

        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionConfig;
    use crate::services::connector::MockConnector;
    use crate::services::store::MemoryStore;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    const KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

    fn test_vault() -> SecretVault {
        let config = EncryptionConfig {
            key: BASE64.encode([7u8; 32]),
        };
        SecretVault::new(&config).unwrap()
    }

    fn service_with(
        connector: Arc<MockConnector>,
    ) -> (ClusterService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let service = ClusterService::new(store.clone(), test_vault(), connector);
        (service, store)
    }

    fn service() -> (ClusterService, Arc<MemoryStore>) {
        service_with(Arc::new(MockConnector::default()))
    }

    fn create_req(name: &str) -> CreateClusterRequest {
        CreateClusterRequest {
            name: name.to_string(),
            description: Some("test cluster".to_string()),
            kubeconfig: KUBECONFIG.to_string(),
            context: Some("default".to_string()),
            tags: None,
        }
    }

    fn update_req() -> UpdateClusterRequest {
        UpdateClusterRequest {
            name: None,
            description: None,
            kubeconfig: None,
            context: None,
            tags: None,
            is_active: None,
        }
    }

    #[tokio::test]
    async fn create_encrypts_the_kubeconfig_at_rest() {
        let (service, store) = service();
        let owner = Uuid::new_v4();

        let cluster = service.create(owner, create_req("prod")).await.unwrap();
        assert!(!cluster.is_active);
        assert!(!cluster.is_connected);
        assert_eq!(cluster.version, None);

        let stored = store
            .clusters
            .lock()
            .unwrap()
            .get(&cluster.cluster_id)
            .cloned()
            .unwrap();
        assert_ne!(stored.kubeconfig_encrypted, KUBECONFIG);
        assert!(!stored.kubeconfig_encrypted.contains("apiVersion"));
        assert_eq!(test_vault().decrypt(&stored.kubeconfig_encrypted).unwrap(), KUBECONFIG);
    }

    #[tokio::test]
    async fn duplicate_names_conflict_only_within_one_owner() {
        let (service, _store) = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        service.create(alice, create_req("prod")).await.unwrap();

        let err = service.create(alice, create_req("prod")).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateClusterName(name) if name == "prod"));

        // Same name under another owner is fine
        service.create(bob, create_req("prod")).await.unwrap();
    }

    #[tokio::test]
    async fn get_and_list_are_ownership_scoped() {
        let (service, _store) = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let beta = service.create(alice, create_req("beta")).await.unwrap();
        service.create(alice, create_req("alpha")).await.unwrap();
        service.create(bob, create_req("gamma")).await.unwrap();

        let names: Vec<String> = service
            .list(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(matches!(
            service.get(bob, beta.cluster_id).await,
            Err(ServiceError::NotOwner)
        ));
        assert!(matches!(
            service.get(alice, Uuid::new_v4()).await,
            Err(ServiceError::ClusterNotFound)
        ));
    }

    #[tokio::test]
    async fn mutations_require_ownership() {
        let (service, _store) = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let cluster = service.create(alice, create_req("prod")).await.unwrap();

        assert!(matches!(
            service.update(bob, cluster.cluster_id, update_req()).await,
            Err(ServiceError::NotOwner)
        ));
        assert!(matches!(
            service.delete(bob, cluster.cluster_id).await,
            Err(ServiceError::NotOwner)
        ));
        assert!(matches!(
            service.test_connection(bob, cluster.cluster_id).await,
            Err(ServiceError::NotOwner)
        ));
        assert!(matches!(
            service.activate(bob, cluster.cluster_id).await,
            Err(ServiceError::NotOwner)
        ));
    }

    #[tokio::test]
    async fn update_reencrypts_a_replacement_kubeconfig() {
        let (service, store) = service();
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();

        let replacement = "apiVersion: v1\nkind: Config\ncurrent-context: new\n";
        let mut req = update_req();
        req.name = Some("prod-eu".to_string());
        req.kubeconfig = Some(replacement.to_string());

        let updated = service.update(owner, cluster.cluster_id, req).await.unwrap();
        assert_eq!(updated.name, "prod-eu");

        let stored = store
            .clusters
            .lock()
            .unwrap()
            .get(&cluster.cluster_id)
            .cloned()
            .unwrap();
        assert_eq!(
            test_vault().decrypt(&stored.kubeconfig_encrypted).unwrap(),
            replacement
        );
    }

    #[tokio::test]
    async fn update_rejects_a_sibling_cluster_name() {
        let (service, _store) = service();
        let owner = Uuid::new_v4();
        service.create(owner, create_req("prod")).await.unwrap();
        let staging = service.create(owner, create_req("staging")).await.unwrap();

        let mut req = update_req();
        req.name = Some("prod".to_string());
        assert!(matches!(
            service.update(owner, staging.cluster_id, req).await,
            Err(ServiceError::DuplicateClusterName(_))
        ));

        // Keeping the current name is not a conflict
        let mut req = update_req();
        req.name = Some("staging".to_string());
        service.update(owner, staging.cluster_id, req).await.unwrap();
    }

    #[tokio::test]
    async fn activation_via_update_stays_exclusive() {
        let (service, _store) = service();
        let owner = Uuid::new_v4();
        let first = service.create(owner, create_req("first")).await.unwrap();
        let second = service.create(owner, create_req("second")).await.unwrap();

        service.activate(owner, first.cluster_id).await.unwrap();

        let mut req = update_req();
        req.is_active = Some(true);
        let updated = service.update(owner, second.cluster_id, req).await.unwrap();
        assert!(updated.is_active);

        let first_now = service.get(owner, first.cluster_id).await.unwrap();
        assert!(!first_now.is_active);
    }

    #[tokio::test]
    async fn activate_swaps_the_single_active_cluster() {
        let (service, _store) = service();
        let owner = Uuid::new_v4();
        let a = service.create(owner, create_req("a")).await.unwrap();
        let b = service.create(owner, create_req("b")).await.unwrap();

        let activated = service.activate(owner, a.cluster_id).await.unwrap();
        assert!(activated.is_active);

        let activated = service.activate(owner, b.cluster_id).await.unwrap();
        assert!(activated.is_active);

        let a_now = service.get(owner, a.cluster_id).await.unwrap();
        assert!(!a_now.is_active);
    }

    #[tokio::test]
    async fn probe_sees_the_decrypted_config_and_context() {
        let mock = Arc::new(MockConnector::reachable("v1.30.1"));
        let (service, _store) = service_with(mock.clone());
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();

        service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();

        let probes = mock.probes.lock().unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].0, KUBECONFIG);
        assert_eq!(probes[0].1, "default");
    }

    #[tokio::test]
    async fn probe_outcome_is_persisted() {
        let mock = Arc::new(MockConnector::reachable("v1.30.1"));
        let (service, _store) = service_with(mock.clone());
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();

        let result = service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(result.connected);
        assert_eq!(result.version.as_deref(), Some("v1.30.1"));

        let row = service.get(owner, cluster.cluster_id).await.unwrap();
        assert!(row.is_connected);
        assert_eq!(row.version.as_deref(), Some("v1.30.1"));
        assert!(row.last_connected_utc.is_some());

        // A later failed probe flips the flag but keeps the known version
        *mock.result.lock().unwrap() =
            Some(ConnectionTestResult::unreachable("Connection failed: refused"));
        let result = service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(!result.connected);
        assert_eq!(result.error.as_deref(), Some("Connection failed: refused"));

        let row = service.get(owner, cluster.cluster_id).await.unwrap();
        assert!(!row.is_connected);
        assert_eq!(row.version.as_deref(), Some("v1.30.1"));
    }

    #[tokio::test]
    async fn undecryptable_kubeconfig_is_a_failed_probe() {
        let mock = Arc::new(MockConnector::default());
        let (service, store) = service_with(mock.clone());
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();

        store
            .clusters
            .lock()
            .unwrap()
            .get_mut(&cluster.cluster_id)
            .unwrap()
            .kubeconfig_encrypted = "corrupted".to_string();

        let result = service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(!result.connected);
        assert_eq!(result.error.as_deref(), Some("Failed to decrypt kubeconfig"));

        // The connector never saw anything
        assert!(mock.probes.lock().unwrap().is_empty());

        let row = service.get(owner, cluster.cluster_id).await.unwrap();
        assert!(!row.is_connected);
    }

    #[tokio::test]
    async fn cache_serves_only_matching_fingerprints() {
        let (service, _store) = service();
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();

        service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();

        let fingerprint = config_fingerprint(KUBECONFIG, "default");
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_some());

        // A different fingerprint misses and drops the stale entry
        let other = config_fingerprint("different config", "default");
        assert!(service.clients.get(cluster.cluster_id, &other).is_none());
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_none());
    }

    #[tokio::test]
    async fn update_and_delete_evict_the_cached_handle() {
        let (service, _store) = service();
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();
        let fingerprint = config_fingerprint(KUBECONFIG, "default");

        service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_some());

        // Even a metadata-only update invalidates the handle
        let mut req = update_req();
        req.description = Some("renamed".to_string());
        service.update(owner, cluster.cluster_id, req).await.unwrap();
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_none());

        service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_some());

        service.delete(owner, cluster.cluster_id).await.unwrap();
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_none());
        assert!(matches!(
            service.get(owner, cluster.cluster_id).await,
            Err(ServiceError::ClusterNotFound)
        ));
    }

    #[tokio::test]
    async fn failed_probe_evicts_the_cached_handle() {
        let mock = Arc::new(MockConnector::reachable("v1.30.1"));
        let (service, _store) = service_with(mock.clone());
        let owner = Uuid::new_v4();
        let cluster = service.create(owner, create_req("prod")).await.unwrap();
        let fingerprint = config_fingerprint(KUBECONFIG, "default");

        service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_some());

        *mock.result.lock().unwrap() =
            Some(ConnectionTestResult::unreachable("Connection failed: refused"));
        service
            .test_connection(owner, cluster.cluster_id)
            .await
            .unwrap();
        assert!(service.clients.get(cluster.cluster_id, &fingerprint).is_none());
    }
}
