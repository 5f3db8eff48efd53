//! PostgreSQL store for kubedeck-auth.
//!
//! Uses sqlx runtime queries; schema lives in ./migrations.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{Cluster, Session, User};
use crate::services::store::AuthStore;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AuthStore for Database {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                anyhow::anyhow!("Database health check failed: {}", e)
            })?;
        Ok(())
    }

    // ==================== User Operations ====================

    async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, display_name, avatar_url, is_active, is_verified, auth_provider, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(&user.auth_provider)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, anyhow::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn update_user(&self, user: &User) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, display_name = $4, avatar_url = $5,
                is_active = $6, is_verified = $7, auth_provider = $8, updated_utc = $9
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(&user.auth_provider)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, anyhow::Error> {
        // Sessions and clusters go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    // ==================== Session Operations ====================

    async fn insert_session(&self, session: &Session) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, token_digest, expiry_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_digest)
        .bind(session.expiry_utc)
        .bind(session.revoked_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_session_by_digest(
        &self,
        token_digest: &str,
    ) -> Result<Option<Session>, anyhow::Error> {
        // No revoked filter: callers must see revoked rows to detect replay.
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_digest = $1")
            .bind(token_digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn rotate_session(
        &self,
        old_session_id: Uuid,
        replacement: &Session,
    ) -> Result<bool, anyhow::Error> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow::anyhow!(e))?;

        // Conditional update is the claim: row locking serializes concurrent
        // callers, so exactly one sees rows_affected == 1.
        let claimed = sqlx::query(
            "UPDATE sessions SET revoked_utc = NOW() WHERE session_id = $1 AND revoked_utc IS NULL",
        )
        .bind(old_session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .rows_affected()
            == 1;

        if !claimed {
            tx.rollback().await.map_err(|e| anyhow::anyhow!(e))?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, token_digest, expiry_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(replacement.session_id)
        .bind(replacement.user_id)
        .bind(&replacement.token_digest)
        .bind(replacement.expiry_utc)
        .bind(replacement.revoked_utc)
        .bind(replacement.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

        tx.commit().await.map_err(|e| anyhow::anyhow!(e))?;
        Ok(true)
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = NOW() WHERE session_id = $1 AND revoked_utc IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_user_sessions(&self, user_id: Uuid) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = NOW() WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(result.rows_affected())
    }

    // ==================== Cluster Operations ====================

    async fn insert_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO clusters (cluster_id, owner_id, name, description, kubeconfig_encrypted, context, tags, is_active, is_connected, version, created_utc, updated_utc, last_connected_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(cluster.cluster_id)
        .bind(cluster.owner_id)
        .bind(&cluster.name)
        .bind(&cluster.description)
        .bind(&cluster.kubeconfig_encrypted)
        .bind(&cluster.context)
        .bind(&cluster.tags)
        .bind(cluster.is_active)
        .bind(cluster.is_connected)
        .bind(&cluster.version)
        .bind(cluster.created_utc)
        .bind(cluster.updated_utc)
        .bind(cluster.last_connected_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_cluster_by_id(
        &self,
        cluster_id: Uuid,
    ) -> Result<Option<Cluster>, anyhow::Error> {
        sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE cluster_id = $1")
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_clusters_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<Cluster>, anyhow::Error> {
        sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE owner_id = $1 ORDER BY name")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_cluster_by_owner_and_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Cluster>, anyhow::Error> {
        sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE owner_id = $1 AND name = $2")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn update_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE clusters
            SET name = $2, description = $3, kubeconfig_encrypted = $4, context = $5,
                tags = $6, is_active = $7, is_connected = $8, version = $9,
                updated_utc = $10, last_connected_utc = $11
            WHERE cluster_id = $1
            "#,
        )
        .bind(cluster.cluster_id)
        .bind(&cluster.name)
        .bind(&cluster.description)
        .bind(&cluster.kubeconfig_encrypted)
        .bind(&cluster.context)
        .bind(&cluster.tags)
        .bind(cluster.is_active)
        .bind(cluster.is_connected)
        .bind(&cluster.version)
        .bind(cluster.updated_utc)
        .bind(cluster.last_connected_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn record_cluster_probe(
        &self,
        cluster_id: Uuid,
        connected: bool,
        version: Option<String>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE clusters
            SET is_connected = $2,
                version = CASE WHEN $2 THEN COALESCE($3, version) ELSE version END,
                last_connected_utc = CASE WHEN $2 THEN NOW() ELSE last_connected_utc END,
                updated_utc = NOW()
            WHERE cluster_id = $1
            "#,
        )
        .bind(cluster_id)
        .bind(connected)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn activate_cluster(
        &self,
        owner_id: Uuid,
        cluster_id: Uuid,
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow::anyhow!(e))?;

        sqlx::query(
            r#"
            UPDATE clusters SET is_active = false, updated_utc = NOW()
            WHERE owner_id = $1 AND is_active = true AND cluster_id <> $2
            "#,
        )
        .bind(owner_id)
        .bind(cluster_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

        sqlx::query(
            r#"
            UPDATE clusters SET is_active = true, updated_utc = NOW()
            WHERE cluster_id = $1 AND is_active = false
            "#,
        )
        .bind(cluster_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

        tx.commit().await.map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn delete_cluster(&self, cluster_id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM clusters WHERE cluster_id = $1")
            .bind(cluster_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }
}
