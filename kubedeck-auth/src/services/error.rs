use kubedeck_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Please login with {0}")]
    WrongProvider(String),

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Registration is disabled")]
    RegistrationDisabled,

    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Cluster not found")]
    ClusterNotFound,

    #[error("A cluster with the name '{0}' already exists")]
    DuplicateClusterName(String),

    #[error("Not authorized to access this resource")]
    NotOwner,

    #[error("Decryption failed")]
    Decryption,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            // Authentication failures share one response body so the surface
            // never discloses whether an account exists or why it refused.
            ServiceError::InvalidCredentials
            | ServiceError::WrongProvider(_)
            | ServiceError::AccountDisabled
            | ServiceError::InvalidToken
            | ServiceError::TokenExpired => {
                tracing::debug!(cause = %err, "Authentication refused");
                AppError::AuthError(anyhow::anyhow!("Authentication failed"))
            }
            ServiceError::RegistrationDisabled => AppError::Forbidden(anyhow::anyhow!(
                "Registration is disabled. Contact administrator for account creation."
            )),
            ServiceError::EmailTaken => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::ClusterNotFound => {
                AppError::NotFound(anyhow::anyhow!("Cluster not found"))
            }
            ServiceError::DuplicateClusterName(name) => AppError::Conflict(anyhow::anyhow!(
                "A cluster with the name '{}' already exists",
                name
            )),
            ServiceError::NotOwner => AppError::Forbidden(anyhow::anyhow!(
                "Not authorized to access this resource"
            )),
            ServiceError::Decryption => {
                AppError::DecryptionError(anyhow::anyhow!("Failed to decrypt stored credentials"))
            }
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}
