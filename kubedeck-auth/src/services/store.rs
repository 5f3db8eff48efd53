//! Persistence seam for identities, sessions, and cluster registrations.
//!
//! `AuthStore` is the contract the service layer talks to. The Postgres
//! implementation lives in `services::database`; `MemoryStore` backs tests
//! and local development without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Cluster, Session, User};

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn health_check(&self) -> Result<(), anyhow::Error>;

    // ==================== User Operations ====================

    async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, anyhow::Error>;
    /// Lookup is case-insensitive; emails are stored lowercased.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error>;
    /// Full-row update keyed by `user_id`.
    async fn update_user(&self, user: &User) -> Result<(), anyhow::Error>;
    /// Removes the user together with all their sessions and clusters.
    /// Returns false when no such user existed.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, anyhow::Error>;

    // ==================== Session Operations ====================

    async fn insert_session(&self, session: &Session) -> Result<(), anyhow::Error>;
    /// Digest lookup deliberately includes revoked rows: a hit on a revoked
    /// session is how replayed refresh secrets are detected.
    async fn find_session_by_digest(
        &self,
        token_digest: &str,
    ) -> Result<Option<Session>, anyhow::Error>;
    /// Atomically revoke `old_session_id` and insert `replacement`, but only
    /// if the old session is still unrevoked. Returns whether this call
    /// claimed the rotation; concurrent callers get exactly one `true`.
    /// On `false` nothing is persisted.
    async fn rotate_session(
        &self,
        old_session_id: Uuid,
        replacement: &Session,
    ) -> Result<bool, anyhow::Error>;
    /// Revoke a session if it is still unrevoked. Returns whether this call
    /// performed the revocation; already-revoked sessions are left untouched.
    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, anyhow::Error>;
    /// Revoke every unrevoked session of a user. Returns the revoked count.
    async fn revoke_all_user_sessions(&self, user_id: Uuid) -> Result<u64, anyhow::Error>;

    // ==================== Cluster Operations ====================

    async fn insert_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error>;
    async fn find_cluster_by_id(&self, cluster_id: Uuid)
        -> Result<Option<Cluster>, anyhow::Error>;
    async fn find_clusters_by_owner(&self, owner_id: Uuid)
        -> Result<Vec<Cluster>, anyhow::Error>;
    async fn find_cluster_by_owner_and_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Cluster>, anyhow::Error>;
    /// Full-row update keyed by `cluster_id`.
    async fn update_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error>;
    /// Persist the outcome of a connection probe. A successful probe records
    /// the reported version and the probe time; a failed probe only flips
    /// `is_connected` and keeps the last known version.
    async fn record_cluster_probe(
        &self,
        cluster_id: Uuid,
        connected: bool,
        version: Option<String>,
    ) -> Result<(), anyhow::Error>;
    /// Make `cluster_id` the owner's single active cluster, deactivating the
    /// rest in the same transaction.
    async fn activate_cluster(&self, owner_id: Uuid, cluster_id: Uuid)
        -> Result<(), anyhow::Error>;
    /// Returns false when no such cluster existed.
    async fn delete_cluster(&self, cluster_id: Uuid) -> Result<bool, anyhow::Error>;
}

/// In-memory store with the same claim semantics as the Postgres
/// implementation. One mutex per table keeps rotation atomic.
pub struct MemoryStore {
    pub users: Mutex<HashMap<Uuid, User>>,
    pub sessions: Mutex<HashMap<Uuid, Session>>,
    pub clusters: Mutex<HashMap<Uuid, Cluster>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            clusters: Mutex::new(HashMap::new()),
        }
    }

    fn lock<'a, T>(
        table: &'a Mutex<HashMap<Uuid, T>>,
        name: &str,
    ) -> Result<std::sync::MutexGuard<'a, HashMap<Uuid, T>>, anyhow::Error> {
        table
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store {} mutex poisoned: {}", name, e))
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error> {
        let mut users = Self::lock(&self.users, "users")?;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(anyhow::anyhow!("duplicate email: {}", user.email));
        }
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, anyhow::Error> {
        Ok(Self::lock(&self.users, "users")?.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        Ok(Self::lock(&self.users, "users")?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), anyhow::Error> {
        Self::lock(&self.users, "users")?.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, anyhow::Error> {
        let existed = Self::lock(&self.users, "users")?.remove(&user_id).is_some();
        if existed {
            Self::lock(&self.sessions, "sessions")?.retain(|_, s| s.user_id != user_id);
            Self::lock(&self.clusters, "clusters")?.retain(|_, c| c.owner_id != user_id);
        }
        Ok(existed)
    }

    async fn insert_session(&self, session: &Session) -> Result<(), anyhow::Error> {
        Self::lock(&self.sessions, "sessions")?.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session_by_digest(
        &self,
        token_digest: &str,
    ) -> Result<Option<Session>, anyhow::Error> {
        Ok(Self::lock(&self.sessions, "sessions")?
            .values()
            .find(|s| s.token_digest == token_digest)
            .cloned())
    }

    async fn rotate_session(
        &self,
        old_session_id: Uuid,
        replacement: &Session,
    ) -> Result<bool, anyhow::Error> {
        let mut sessions = Self::lock(&self.sessions, "sessions")?;
        match sessions.get_mut(&old_session_id) {
            Some(old) if old.revoked_utc.is_none() => {
                old.revoked_utc = Some(Utc::now());
                sessions.insert(replacement.session_id, replacement.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, anyhow::Error> {
        let mut sessions = Self::lock(&self.sessions, "sessions")?;
        match sessions.get_mut(&session_id) {
            Some(s) if s.revoked_utc.is_none() => {
                s.revoked_utc = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_user_sessions(&self, user_id: Uuid) -> Result<u64, anyhow::Error> {
        let mut sessions = Self::lock(&self.sessions, "sessions")?;
        let now = Utc::now();
        let mut count = 0;
        for s in sessions.values_mut() {
            if s.user_id == user_id && s.revoked_utc.is_none() {
                s.revoked_utc = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error> {
        let mut clusters = Self::lock(&self.clusters, "clusters")?;
        if clusters
            .values()
            .any(|c| c.owner_id == cluster.owner_id && c.name == cluster.name)
        {
            return Err(anyhow::anyhow!("duplicate cluster name: {}", cluster.name));
        }
        clusters.insert(cluster.cluster_id, cluster.clone());
        Ok(())
    }

    async fn find_cluster_by_id(
        &self,
        cluster_id: Uuid,
    ) -> Result<Option<Cluster>, anyhow::Error> {
        Ok(Self::lock(&self.clusters, "clusters")?
            .get(&cluster_id)
            .cloned())
    }

    async fn find_clusters_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<Cluster>, anyhow::Error> {
        let mut found: Vec<Cluster> = Self::lock(&self.clusters, "clusters")?
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_cluster_by_owner_and_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Cluster>, anyhow::Error> {
        Ok(Self::lock(&self.clusters, "clusters")?
            .values()
            .find(|c| c.owner_id == owner_id && c.name == name)
            .cloned())
    }

    async fn update_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error> {
        Self::lock(&self.clusters, "clusters")?.insert(cluster.cluster_id, cluster.clone());
        Ok(())
    }

    async fn record_cluster_probe(
        &self,
        cluster_id: Uuid,
        connected: bool,
        version: Option<String>,
    ) -> Result<(), anyhow::Error> {
        let mut clusters = Self::lock(&self.clusters, "clusters")?;
        if let Some(c) = clusters.get_mut(&cluster_id) {
            c.is_connected = connected;
            if connected {
                if version.is_some() {
                    c.version = version;
                }
                c.last_connected_utc = Some(Utc::now());
            }
            c.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn activate_cluster(
        &self,
        owner_id: Uuid,
        cluster_id: Uuid,
    ) -> Result<(), anyhow::Error> {
        let mut clusters = Self::lock(&self.clusters, "clusters")?;
        let now = Utc::now();
        for c in clusters.values_mut() {
            if c.owner_id == owner_id {
                let target = c.cluster_id == cluster_id;
                if c.is_active != target {
                    c.is_active = target;
                    c.updated_utc = now;
                }
            }
        }
        Ok(())
    }

    async fn delete_cluster(&self, cluster_id: Uuid) -> Result<bool, anyhow::Error> {
        Ok(Self::lock(&self.clusters, "clusters")?
            .remove(&cluster_id)
            .is_some())
    }
}
