//! Access-token codec and refresh-secret generation.
//!
//! Access tokens are stateless signed JWTs; their validity is decided by
//! signature, expiry, and the `type` claim alone. Refresh secrets are opaque
//! random values: never signed, never decoded, validated solely by digest
//! lookup against the session store.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use kubedeck_core::error::AppError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::JwtConfig;

const ACCESS_TOKEN_TYPE: &str = "access";

/// Signs and verifies access tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_expiry_minutes: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Email at issue time
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Claim kind discriminator; always "access"
    #[serde(rename = "type")]
    pub token_type: String,
}

impl TokenService {
    /// Create a token service from the configured signing secret.
    pub fn new(config: &JwtConfig) -> Result<Self, AppError> {
        let algorithm = Algorithm::from_str(&config.algorithm).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Unsupported JWT_ALGORITHM '{}': {}",
                config.algorithm,
                e
            ))
        })?;

        // Asymmetric variants need PEM key material, not a shared secret.
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ALGORITHM must be an HMAC variant, got '{}'",
                config.algorithm
            )));
        }

        tracing::info!(algorithm = %config.algorithm, "Token service initialized");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            algorithm,
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        })
    }

    /// Generate a signed access token for a user.
    pub fn issue_access_token(&self, user_id: Uuid, email: &str) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Validate and decode an access token.
    ///
    /// Returns `None` on signature mismatch, expiry, wrong `type` claim, or
    /// malformed structure. No clock leeway: a token is valid strictly while
    /// `exp > now`.
    pub fn verify_access_token(&self, token: &str) -> Option<AccessTokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = match decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
        {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(cause = %e, "Access token rejected");
                return None;
            }
        };

        // exp == now is already stale
        if token_data.claims.exp <= Utc::now().timestamp() {
            tracing::debug!("Access token rejected: expired");
            return None;
        }

        if token_data.claims.token_type != ACCESS_TOKEN_TYPE {
            tracing::debug!("Access token rejected: wrong type claim");
            return None;
        }

        Some(token_data.claims)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

/// Mint a fresh refresh secret.
///
/// Returns the raw value handed to the client and the SHA-256 hex digest
/// that gets persisted. The raw secret never touches the database.
pub fn generate_refresh_secret() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let raw = URL_SAFE_NO_PAD.encode(bytes);
    let digest = digest_refresh_secret(&raw);
    (raw, digest)
}

/// Digest a presented refresh secret for store lookup.
pub fn digest_refresh_secret(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
