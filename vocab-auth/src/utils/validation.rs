use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::dtos::ErrorResponse;

pub const USERNAME_MIN_LEN: usize = 8;
pub const USERNAME_MAX_LEN: usize = 20;

/// 8-20 characters of letters, digits, `.` and `_`; separators may not lead,
/// trail or repeat back to back.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::new("username_length"));
    }

    let is_sep = |c: char| c == '.' || c == '_';
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || is_sep(c))
    {
        return Err(ValidationError::new("username_charset"));
    }

    if username.starts_with(is_sep) || username.ends_with(is_sep) {
        return Err(ValidationError::new("username_separator_edge"));
    }

    let doubled = username
        .as_bytes()
        .windows(2)
        .any(|pair| is_sep(pair[0] as char) && is_sep(pair[1] as char));
    if doubled {
        return Err(ValidationError::new("username_separator_run"));
    }

    Ok(())
}

fn rejection(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| rejection(StatusCode::BAD_REQUEST, format!("Json parse error: {}", e)))?;

        value.validate().map_err(|e| {
            rejection(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation error: {}", e),
            )
        })?;

        Ok(ValidatedJson(value))
    }
}

/// Query-string counterpart of [`ValidatedJson`]; both failures are 422.
pub struct ValidatedQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                rejection(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("Query parse error: {}", e),
                )
            })?;

        value.validate().map_err(|e| {
            rejection(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation error: {}", e),
            )
        })?;

        Ok(ValidatedQuery(value))
    }
}
