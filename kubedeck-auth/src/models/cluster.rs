//! Cluster model - tenant cluster registrations with encrypted kubeconfigs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Cluster entity.
///
/// `kubeconfig_encrypted` is vault output; the plaintext kubeconfig exists
/// only transiently in memory while an operation needs it.
#[derive(Debug, Clone, FromRow)]
pub struct Cluster {
    pub cluster_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kubeconfig_encrypted: String,
    pub context: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub is_connected: bool,
    pub version: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub last_connected_utc: Option<DateTime<Utc>>,
}

impl Cluster {
    /// Create a new cluster record from already-encrypted credentials.
    pub fn new(
        owner_id: Uuid,
        name: String,
        description: Option<String>,
        kubeconfig_encrypted: String,
        context: String,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            cluster_id: Uuid::new_v4(),
            owner_id,
            name,
            description,
            kubeconfig_encrypted,
            context,
            tags,
            is_active: false,
            is_connected: false,
            version: None,
            created_utc: now,
            updated_utc: now,
            last_connected_utc: None,
        }
    }
}

/// Cluster view for API responses. Never carries credential material.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClusterResponse {
    pub cluster_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub context: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub is_connected: bool,
    pub version: Option<String>,
    pub owner_id: Uuid,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub last_connected_utc: Option<DateTime<Utc>>,
}

impl From<Cluster> for ClusterResponse {
    fn from(c: Cluster) -> Self {
        Self {
            cluster_id: c.cluster_id,
            name: c.name,
            description: c.description,
            context: c.context,
            tags: c.tags,
            is_active: c.is_active,
            is_connected: c.is_connected,
            version: c.version,
            owner_id: c.owner_id,
            created_utc: c.created_utc,
            updated_utc: c.updated_utc,
            last_connected_utc: c.last_connected_utc,
        }
    }
}

/// Outcome of probing a cluster's API server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResult {
    pub connected: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn reachable(version: Option<String>) -> Self {
        Self {
            connected: true,
            version,
            error: None,
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            version: None,
            error: Some(error.into()),
        }
    }
}
