use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::{CookieJar, SignedCookieJar};
use service_core::error::AppError;

use crate::{
    dtos::{AuthResult, CallbackParams, ErrorResponse, UserInLogin, UserInOAuthCreate},
    models::OAuthBackend,
    services::CallbackOutcome,
    utils::{session::CookieSession, ClientInfo, ValidatedJson},
    AppState,
};

use super::auth::{login_failed, with_refresh_cookie};

/// Absolute callback URL for `backend`, as seen by the browser.
fn callback_url(headers: &HeaderMap, backend: OAuthBackend) -> Result<String, AppError> {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Host header is missing")))?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    Ok(format!("{}://{}/api/oauth/{}/callback", scheme, host, backend))
}

/// Start sign-in with an external provider
#[utoipa::path(
    get,
    path = "/api/oauth/{backend}/redirect",
    params(("backend" = OAuthBackend, Path, description = "OAuth provider")),
    responses(
        (status = 302, description = "Redirect to the provider consent page"),
        (status = 400, description = "Provider is not configured", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn redirect(
    State(state): State<AppState>,
    Path(backend): Path<OAuthBackend>,
    headers: HeaderMap,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Response), AppError> {
    let redirect_uri = callback_url(&headers, backend)?;
    let mut session = CookieSession::load(&jar);

    let url = state
        .oauth
        .authorization_url(backend, &redirect_uri, &mut session)?;

    let response = (StatusCode::FOUND, [(header::LOCATION, url)]).into_response();
    Ok((session.save(jar), response))
}

/// Provider callback
///
/// Signs the user in when the external identity is already linked. Otherwise
/// the identity is parked in the session and the caller is told whether it
/// must link (401, body is the taken email) or may link or register (300).
#[utoipa::path(
    get,
    path = "/api/oauth/{backend}/callback",
    params(
        ("backend" = OAuthBackend, Path, description = "OAuth provider"),
        CallbackParams
    ),
    responses(
        (status = 200, description = "Signed in through a linked identity", body = AuthResult),
        (status = 300, description = "No matching account; link or register"),
        (status = 400, description = "Provider or state error", body = ErrorResponse),
        (status = 401, description = "Provider email is taken; link required", body = String)
    ),
    tag = "OAuth"
)]
pub async fn callback(
    State(state): State<AppState>,
    Path(backend): Path<OAuthBackend>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    client: ClientInfo,
    jar: SignedCookieJar,
    cookies: CookieJar,
) -> Result<(SignedCookieJar, CookieJar, Response), AppError> {
    let redirect_uri = callback_url(&headers, backend)?;
    let mut session = CookieSession::load(&jar);

    let outcome = state
        .oauth
        .callback(backend, params, &redirect_uri, &mut session, &client)
        .await;
    // The state is single use even when the callback fails.
    let jar = session.save(jar);

    let (cookies, response) = match outcome {
        Ok(CallbackOutcome::Authenticated(result)) => (
            with_refresh_cookie(&state, cookies, &result),
            (StatusCode::OK, Json(result)).into_response(),
        ),
        Ok(CallbackOutcome::LinkRequired { email }) => {
            (cookies, (StatusCode::UNAUTHORIZED, Json(email)).into_response())
        }
        Ok(CallbackOutcome::LinkOrRegister) => (
            cookies,
            (StatusCode::MULTIPLE_CHOICES, Json(serde_json::Value::Null)).into_response(),
        ),
        Err(e) => (cookies, AppError::from(e).into_response()),
    };

    Ok((jar, cookies, response))
}

/// Link the pending external identity to an existing account
#[utoipa::path(
    post,
    path = "/api/oauth/{backend}/link",
    params(("backend" = OAuthBackend, Path, description = "OAuth provider")),
    request_body = UserInLogin,
    responses(
        (status = 200, description = "Identity linked and user signed in", body = AuthResult),
        (status = 400, description = "No pending identity or collision", body = ErrorResponse),
        (status = 401, description = "Login failed", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn link(
    State(state): State<AppState>,
    Path(backend): Path<OAuthBackend>,
    client: ClientInfo,
    jar: SignedCookieJar,
    cookies: CookieJar,
    ValidatedJson(payload): ValidatedJson<UserInLogin>,
) -> Result<(SignedCookieJar, CookieJar, Json<AuthResult>), AppError> {
    let mut session = CookieSession::load(&jar);

    let result = state
        .oauth
        .link(backend, &payload, &mut session, &client)
        .await
        .map_err(login_failed)?;

    let cookies = with_refresh_cookie(&state, cookies, &result);
    Ok((session.save(jar), cookies, Json(result)))
}

/// Register a new account for the pending external identity
#[utoipa::path(
    post,
    path = "/api/oauth/{backend}/register",
    params(("backend" = OAuthBackend, Path, description = "OAuth provider")),
    request_body = UserInOAuthCreate,
    responses(
        (status = 200, description = "Account created, linked and signed in", body = AuthResult),
        (status = 400, description = "No pending identity or conflict", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn register(
    State(state): State<AppState>,
    Path(backend): Path<OAuthBackend>,
    client: ClientInfo,
    jar: SignedCookieJar,
    cookies: CookieJar,
    ValidatedJson(payload): ValidatedJson<UserInOAuthCreate>,
) -> Result<(SignedCookieJar, CookieJar, Json<AuthResult>), AppError> {
    let mut session = CookieSession::load(&jar);

    let result = state
        .oauth
        .register(backend, &payload, &mut session, &client)
        .await?;

    state
        .mail
        .send_thank_for_registering(result.user.email.clone(), result.user.username.clone());

    let cookies = with_refresh_cookie(&state, cookies, &result);
    Ok((session.save(jar), cookies, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_callback_url_from_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        assert_eq!(
            callback_url(&headers, OAuthBackend::Google).unwrap(),
            "http://localhost:8080/api/oauth/google/callback"
        );
    }

    #[test]
    fn test_callback_url_behind_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8080"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("vocab.example"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(
            callback_url(&headers, OAuthBackend::Discord).unwrap(),
            "https://vocab.example/api/oauth/discord/callback"
        );
    }

    #[test]
    fn test_callback_url_requires_host() {
        assert!(callback_url(&HeaderMap::new(), OAuthBackend::Google).is_err());
    }
}
