use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{AuthResult, ErrorResponse, RegisterQuery, UserInCreate, UserInLogin},
    services::AuthError,
    utils::{
        cookies::{clear_refresh_cookie, refresh_token, set_refresh_cookie},
        ClientInfo, ValidatedJson, ValidatedQuery,
    },
    AppState,
};

const LOGIN_FAILED: &str = "Login failed. Credentials are invalid.";

/// Login errors are reported uniformly so callers cannot probe for accounts.
pub(crate) fn login_failed(err: AuthError) -> AppError {
    if err.is_login_error() {
        tracing::info!(reason = err.kind(), "Login rejected");
        AppError::rejected(StatusCode::UNAUTHORIZED, "login_failed", LOGIN_FAILED)
    } else {
        err.into()
    }
}

pub(crate) fn with_refresh_cookie(
    state: &AppState,
    jar: CookieJar,
    result: &AuthResult,
) -> CookieJar {
    set_refresh_cookie(
        jar,
        &result.credentials.refresh_token,
        state.auth.authenticator().refresh_token_expire_in_seconds(),
    )
}

/// Register with a mailed verification code
#[utoipa::path(
    post,
    path = "/api/auth/register",
    params(RegisterQuery),
    request_body = UserInCreate,
    responses(
        (status = 200, description = "User registered and signed in", body = AuthResult),
        (status = 400, description = "Email or username already taken", body = ErrorResponse),
        (status = 401, description = "Action has not been verified", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    ValidatedQuery(query): ValidatedQuery<RegisterQuery>,
    ValidatedJson(payload): ValidatedJson<UserInCreate>,
) -> Result<(CookieJar, Json<AuthResult>), AppError> {
    let result = state.auth.register(&payload, query.code, &client).await?;

    state
        .mail
        .send_thank_for_registering(result.user.email.clone(), result.user.username.clone());

    let jar = with_refresh_cookie(&state, jar, &result);
    Ok((jar, Json(result)))
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = UserInLogin,
    responses(
        (status = 200, description = "Signed in", body = AuthResult),
        (status = 401, description = "Login failed", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<UserInLogin>,
) -> Result<(CookieJar, Json<AuthResult>), AppError> {
    let result = state
        .auth
        .login(&payload, &client)
        .await
        .map_err(login_failed)?;

    let jar = with_refresh_cookie(&state, jar, &result);
    Ok((jar, Json(result)))
}

/// End the refresh session held in the cookie
#[utoipa::path(
    get,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Signed out; refresh cookie removed"),
        (status = 400, description = "Refresh session missing or expired", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    let session_error = |e: AuthError| {
        if e.is_session_error() {
            e.with_status(StatusCode::BAD_REQUEST)
        } else {
            e.into()
        }
    };

    let token = refresh_token(&jar).ok_or_else(|| session_error(AuthError::SessionDoesNotExist))?;
    state.auth.logout(&token).await.map_err(session_error)?;

    Ok((clear_refresh_cookie(jar), StatusCode::OK))
}

/// Rotate the refresh session and issue new credentials
#[utoipa::path(
    get,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New credentials issued", body = AuthResult),
        (status = 401, description = "Refresh session missing or expired", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthResult>), AppError> {
    let token = refresh_token(&jar).ok_or(AuthError::SessionDoesNotExist)?;
    let result = state.auth.refresh(&token, &client).await?;

    let jar = with_refresh_cookie(&state, jar, &result);
    Ok((jar, Json(result)))
}
