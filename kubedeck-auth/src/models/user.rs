//! User model - dashboard accounts with local or external provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where an account's credentials live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
    Github,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
        }
    }
}

/// User entity.
///
/// `password_hash` is present only for `local` provenance; externally
/// provisioned accounts authenticate through their provider.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub auth_provider: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new local user. Email is stored lowercased.
    pub fn new_local(email: &str, password_hash: String, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: Some(password_hash),
            display_name,
            avatar_url: None,
            is_active: true,
            is_verified: false,
            auth_provider: AuthProvider::Local.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create a user from a verified external identity. No password verifier
    /// is stored; the provider vouches for the email.
    pub fn new_external(
        email: &str,
        display_name: String,
        avatar_url: Option<String>,
        provider: AuthProvider,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: None,
            display_name,
            avatar_url,
            is_active: true,
            is_verified: true,
            auth_provider: provider.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Convert to sanitized response (no password verifier).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User profile for API responses (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub auth_provider: String,
    pub is_verified: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            name: u.display_name,
            avatar_url: u.avatar_url,
            auth_provider: u.auth_provider,
            is_verified: u.is_verified,
            created_utc: u.created_utc,
        }
    }
}

/// Token pair response after successful auth.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}
