pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum_extra::extract::cookie::Key;
use service_core::axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::{security_headers_middleware, OPENAPI_PATH},
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AuthConfig;
use crate::services::{
    AuthService, Authenticator, BlacklistService, Database, EmailProvider, JwtService,
    KeyValueStore, MailService, OAuthConnectionStore, OAuthProvider, OAuthService, SessionStore,
    UserService, UserStore, VerificationService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::verification::send_verification,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::refresh,
        handlers::oauth::redirect,
        handlers::oauth::callback,
        handlers::oauth::link,
        handlers::oauth::register,
        handlers::users::me,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::HealthResponse,
            dtos::AuthResult,
            dtos::CredentialsInResponse,
            dtos::UserInCreate,
            dtos::UserInLogin,
            dtos::UserInOAuthCreate,
            dtos::VerificationInCreate,
            models::UserResponse,
            models::OAuthBackend,
            models::VerificationAction,
            services::AccessClaims,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Verification", description = "Email verification codes"),
        (name = "Authentication", description = "Registration, sign-in and refresh sessions"),
        (name = "OAuth", description = "Sign-in and account linking through external providers"),
        (name = "User", description = "Current user"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Storage and delivery backends the services are built on.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub connections: Arc<dyn OAuthConnectionStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub email: Arc<dyn EmailProvider>,
    pub oauth: Arc<dyn OAuthProvider>,
    /// Postgres handle for health checks; absent with in-memory stores.
    pub database: Option<Database>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub auth: AuthService,
    pub oauth: OAuthService,
    pub verification: VerificationService,
    pub mail: MailService,
    pub kv: Arc<dyn KeyValueStore>,
    pub database: Option<Database>,
    pub session_key: Key,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub verification_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wires the services together over `backends`.
    pub fn new(config: AuthConfig, backends: Backends) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let blacklist =
            BlacklistService::new(backends.kv.clone(), config.jwt.access_token_expire_in_seconds);
        let authenticator = Authenticator::new(
            jwt,
            blacklist,
            backends.sessions,
            config.jwt.refresh_token_expire_in_seconds,
        );
        let users = UserService::new(backends.users);
        let verification = VerificationService::new(
            backends.kv.clone(),
            config.verification.code_expire_in_seconds,
        );

        let auth = AuthService::new(users.clone(), verification.clone(), authenticator.clone());
        let oauth = OAuthService::new(backends.oauth, backends.connections, users, authenticator);

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let register_rate_limiter =
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);
        let verification_rate_limiter = create_ip_rate_limiter(
            limits.verification_attempts,
            limits.verification_window_seconds,
        );

        Self {
            session_key: utils::cookies::session_key(&config.session.secret),
            config: Arc::new(config),
            auth,
            oauth,
            verification,
            mail: MailService::new(backends.email),
            kv: backends.kv,
            database: backends.database,
            login_rate_limiter,
            register_rate_limiter,
            verification_rate_limiter,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.session_key.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // Credentialed CORS cannot use a literal wildcard, so `*` mirrors the caller.
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let verification_routes = Router::new()
        .route(
            "/api/verification/send",
            post(handlers::verification::send_verification),
        )
        .layer(from_fn_with_state(
            state.verification_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/oauth/:backend/link", post(handlers::oauth::link))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/oauth/:backend/register", post(handlers::oauth::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/api/users/me", get(handlers::users::me))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
        .route("/api/auth/logout", get(handlers::auth::logout))
        .route("/api/auth/refresh", get(handlers::auth::refresh))
        .route("/api/oauth/:backend/redirect", get(handlers::oauth::redirect))
        .route("/api/oauth/:backend/callback", get(handlers::oauth::callback))
        .merge(verification_routes)
        .merge(login_routes)
        .merge(register_routes)
        .merge(protected_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}
