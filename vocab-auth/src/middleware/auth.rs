use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    services::{AccessClaims, AuthError},
    AppState,
};

const HEADER_INVALID: &str = "Authorization header is invalid. \
    Header is omitted or contains inappropriate value format.";
const NOT_BEARER: &str = "Expected to get \"Bearer\" token. Current token is not bearer.";

/// Pulls the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "authorization_header_invalid",
                HEADER_INVALID,
            )
        })?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::rejected(
            StatusCode::UNAUTHORIZED,
            "not_bearer_token",
            NOT_BEARER,
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::rejected(
            StatusCode::UNAUTHORIZED,
            "authorization_header_invalid",
            HEADER_INVALID,
        ));
    }
    Ok(token)
}

/// Requires a valid, non-revoked access token; the claims are stored in the
/// request extensions for [`AuthUser`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?;

    let claims = state
        .auth
        .authenticator()
        .authorize(token)
        .await
        .map_err(|e| match e {
            // Signature failures are not distinguished from other bad tokens.
            AuthError::TokenBadSignature => AppError::from(AuthError::TokenMalformed),
            other => {
                if !other.is_token_error() {
                    tracing::error!(error = %other, "Access token check failed");
                }
                AppError::from(other)
            }
        })?;

    tracing::debug!(user_id = claims.id, "Access token accepted");
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Claims of the authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AccessClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Auth claims missing from request extensions"
                ))
            })
    }
}
