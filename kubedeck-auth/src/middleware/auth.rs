//! Bearer authentication middleware.
//!
//! Resolves the access token to a live account on every request; handlers
//! behind it read the account from request extensions via `CurrentUser`.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use kubedeck_core::error::AppError;

use crate::models::User;
use crate::AppState;

/// Require a valid bearer token and a live account behind it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Authentication failed")))?;

    // Signature, expiry, token type, and account state are all checked here
    let user = state
        .auth
        .resolve(token)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Authentication failed")))?;

    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

/// Extractor for the account resolved by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "CurrentUser missing from request extensions"
            ))
        })
    }
}
