//! Session manager: registration, login, token issuance, rotation, logout.
//!
//! Sessions move ACTIVE -> REVOKED exactly once and never back. Every path
//! that hands out a refresh secret persists only its digest; every path that
//! consumes one resolves it by digest lookup.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::auth::{LoginRequest, RegisterRequest};
use crate::models::{AuthProvider, Session, TokenResponse, User};
use crate::services::error::ServiceError;
use crate::services::metrics;
use crate::services::store::AuthStore;
use crate::services::token::{self, TokenService};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    tokens: TokenService,
    refresh_token_expiry_days: i64,
    allow_registration: bool,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        tokens: TokenService,
        refresh_token_expiry_days: i64,
        allow_registration: bool,
    ) -> Self {
        Self {
            store,
            tokens,
            refresh_token_expiry_days,
            allow_registration,
        }
    }

    /// Create a local account. Callers issue the token pair separately.
    #[tracing::instrument(skip(self, req))]
    pub async fn register(&self, req: RegisterRequest) -> Result<User, ServiceError> {
        if !self.allow_registration {
            return Err(ServiceError::RegistrationDisabled);
        }

        // Check if the email is already taken
        if self
            .store
            .find_user_by_email(&req.email)
            .await
            .map_err(ServiceError::Database)?
            .is_some()
        {
            return Err(ServiceError::EmailTaken);
        }

        // Hash password
        let password_hash = hash_password(&Password::new(req.password)).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;

        let user = User::new_local(&req.email, password_hash.into_string(), req.name);

        self.store
            .insert_user(&user)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(user_id = %user.user_id, "User registered");

        Ok(user)
    }

    /// Verify email/password credentials.
    #[tracing::instrument(skip(self, req))]
    pub async fn login(&self, req: LoginRequest) -> Result<User, ServiceError> {
        // Find user by email
        let user = self
            .store
            .find_user_by_email(&req.email)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::InvalidCredentials)?;

        // Externally provisioned accounts carry no password verifier
        let Some(stored_hash) = user.password_hash.clone() else {
            return Err(ServiceError::WrongProvider(user.auth_provider.clone()));
        };

        // Verify password
        if !verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(stored_hash),
        ) {
            return Err(ServiceError::InvalidCredentials);
        }

        // Account state is checked only after the password verifies
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }

        tracing::info!(user_id = %user.user_id, "User logged in");

        Ok(user)
    }

    /// Find-or-create an account from a verified external identity.
    #[tracing::instrument(skip(self, email, name, avatar_url))]
    pub async fn external_login(
        &self,
        email: &str,
        name: &str,
        avatar_url: Option<String>,
        provider: AuthProvider,
    ) -> Result<User, ServiceError> {
        let existing = self
            .store
            .find_user_by_email(email)
            .await
            .map_err(ServiceError::Database)?;

        let user = match existing {
            Some(mut user) => {
                if !user.is_active {
                    return Err(ServiceError::AccountDisabled);
                }
                // Backfill the avatar on accounts that never had one
                if user.avatar_url.is_none() && avatar_url.is_some() {
                    user.avatar_url = avatar_url;
                    user.updated_utc = Utc::now();
                    self.store
                        .update_user(&user)
                        .await
                        .map_err(ServiceError::Database)?;
                }
                user
            }
            None => {
                let user = User::new_external(email, name.to_string(), avatar_url, provider);
                self.store
                    .insert_user(&user)
                    .await
                    .map_err(ServiceError::Database)?;
                tracing::info!(
                    user_id = %user.user_id,
                    provider = %user.auth_provider,
                    "External identity provisioned"
                );
                user
            }
        };

        Ok(user)
    }

    /// Mint an access token and open a new refresh session.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn issue_tokens(&self, user: &User) -> Result<TokenResponse, ServiceError> {
        let access_token = self
            .tokens
            .issue_access_token(user.user_id, &user.email)
            .map_err(ServiceError::Internal)?;

        let (refresh_token, digest) = token::generate_refresh_secret();
        let session = Session::new(user.user_id, digest, self.refresh_token_expiry_days);

        self.store
            .insert_session(&session)
            .await
            .map_err(ServiceError::Database)?;

        Ok(TokenResponse::new(
            access_token,
            refresh_token,
            self.tokens.access_token_expiry_seconds(),
        ))
    }

    /// Exchange a refresh secret for a new token pair, single-use.
    #[tracing::instrument(skip(self, raw_secret))]
    pub async fn refresh(&self, raw_secret: &str) -> Result<TokenResponse, ServiceError> {
        let digest = token::digest_refresh_secret(raw_secret);

        let session = self
            .store
            .find_session_by_digest(&digest)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::InvalidToken)?;

        // A revoked session matching a presented secret means that secret
        // was already spent once: treat the account as compromised and
        // revoke everything it has.
        if session.is_revoked() {
            let revoked = self
                .store
                .revoke_all_user_sessions(session.user_id)
                .await
                .map_err(ServiceError::Database)?;
            metrics::record_refresh_reuse();
            tracing::warn!(
                user_id = %session.user_id,
                revoked_sessions = revoked,
                "Refresh secret replay detected; revoked all sessions"
            );
            return Err(ServiceError::InvalidToken);
        }

        if session.is_expired() {
            self.store
                .revoke_session(session.session_id)
                .await
                .map_err(ServiceError::Database)?;
            return Err(ServiceError::TokenExpired);
        }

        let user = self
            .store
            .find_user_by_id(session.user_id)
            .await
            .map_err(ServiceError::Database)?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::InvalidToken)?;

        let access_token = self
            .tokens
            .issue_access_token(user.user_id, &user.email)
            .map_err(ServiceError::Internal)?;
        let (refresh_token, new_digest) = token::generate_refresh_secret();
        let replacement = Session::new(user.user_id, new_digest, self.refresh_token_expiry_days);

        // Only the caller whose conditional revoke claims the old row gets
        // the replacement persisted; everyone else lost the race.
        if !self
            .store
            .rotate_session(session.session_id, &replacement)
            .await
            .map_err(ServiceError::Database)?
        {
            return Err(ServiceError::InvalidToken);
        }

        tracing::info!(user_id = %user.user_id, "Token refreshed");

        Ok(TokenResponse::new(
            access_token,
            refresh_token,
            self.tokens.access_token_expiry_seconds(),
        ))
    }

    /// Revoke the session behind a refresh secret. Unknown or already-revoked
    /// secrets are a successful no-op.
    #[tracing::instrument(skip(self, raw_secret))]
    pub async fn logout(&self, raw_secret: &str) -> Result<(), ServiceError> {
        let digest = token::digest_refresh_secret(raw_secret);

        if let Some(session) = self
            .store
            .find_session_by_digest(&digest)
            .await
            .map_err(ServiceError::Database)?
        {
            if self
                .store
                .revoke_session(session.session_id)
                .await
                .map_err(ServiceError::Database)?
            {
                tracing::info!(user_id = %session.user_id, "User logged out");
            }
        }

        Ok(())
    }

    /// Resolve a bearer access token to its account. `None` for anything
    /// invalid, expired, or pointing at a missing or disabled account.
    pub async fn resolve(&self, access_token: &str) -> Result<Option<User>, ServiceError> {
        let Some(claims) = self.tokens.verify_access_token(access_token) else {
            return Ok(None);
        };

        let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
            return Ok(None);
        };

        let user = self
            .store
            .find_user_by_id(user_id)
            .await
            .map_err(ServiceError::Database)?;

        Ok(user.filter(|u| u.is_active))
    }
}
