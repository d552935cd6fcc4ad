//! Shared setup for the router-level integration tests.
//!
//! The app runs entirely on in-memory backends, so no Postgres, Redis, SMTP
//! server or OAuth provider is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use service_core::config::Config;
use std::sync::Arc;
use tower::util::ServiceExt;
use vocab_auth::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, JwtConfig, MailConfig, OAuthClientConfig,
        OAuthConfig, RateLimitConfig, RedisConfig, SecurityConfig, SessionConfig,
        VerificationConfig,
    },
    dtos::AuthResult,
    models::OAuthUser,
    services::{MemoryDatabase, MemoryStore, MockEmailService, MockOAuthProvider},
    AppState, Backends,
};

pub const PASSWORD: &str = "correct horse battery";
pub const GOOD_CODE: &str = "good-code";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: Config::default(),
        environment: Environment::Test,
        service_name: "vocab-auth-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/vocab_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://localhost:6379".to_string(),
        },
        jwt: JwtConfig {
            secret: "integration-jwt-secret-0123456789abcdef".to_string(),
            access_token_expire_in_seconds: 900,
            refresh_token_expire_in_seconds: 3600,
        },
        verification: VerificationConfig {
            code_expire_in_seconds: 300,
        },
        session: SessionConfig {
            secret: "integration-session-secret-0123456789abcdef".to_string(),
        },
        oauth: OAuthConfig {
            google: OAuthClientConfig {
                client_id: "google-id".to_string(),
                client_secret: "google-secret".to_string(),
            },
            discord: OAuthClientConfig {
                client_id: "discord-id".to_string(),
                client_secret: "discord-secret".to_string(),
            },
        },
        mail: MailConfig {
            server: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "noreply@vocab.local".to_string(),
            from_name: "Vocab".to_string(),
            suppress_send: true,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            register_attempts: 100,
            register_window_seconds: 60,
            verification_attempts: 100,
            verification_window_seconds: 60,
        },
    }
}

/// Identity the mock provider returns for [`GOOD_CODE`].
pub fn provider_identity(email: &str) -> OAuthUser {
    OAuthUser {
        id: "google-1001".to_string(),
        email: email.to_string(),
        detail: "Oauth Reader".to_string(),
        is_email_taken: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: Arc<MemoryDatabase>,
    pub kv: Arc<MemoryStore>,
    pub mail: Arc<MockEmailService>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_provider(MockOAuthProvider::new()).await
    }

    /// App whose OAuth provider resolves [`GOOD_CODE`] to `identity`.
    pub async fn with_identity(identity: OAuthUser) -> Self {
        Self::with_provider(MockOAuthProvider::new().with_user(GOOD_CODE, identity)).await
    }

    pub async fn with_provider(provider: MockOAuthProvider) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let kv = Arc::new(MemoryStore::new());
        let mail = Arc::new(MockEmailService::new());

        let state = AppState::new(
            test_config(),
            Backends {
                users: db.clone(),
                sessions: db.clone(),
                connections: db.clone(),
                kv: kv.clone(),
                email: mail.clone(),
                oauth: Arc::new(provider),
                database: None,
            },
        );
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            db,
            kv,
            mail,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    pub async fn get(&self, uri: &str, cookies: &[String]) -> Response<Body> {
        self.send(request(Method::GET, uri, cookies, None)).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        cookies: &[String],
        body: serde_json::Value,
    ) -> Response<Body> {
        self.send(request(Method::POST, uri, cookies, Some(body)))
            .await
    }

    /// Verification code as it would have been mailed.
    pub async fn code_for(&self, email: &str) -> u32 {
        self.state
            .verification
            .get_or_create(email)
            .await
            .expect("Failed to issue code")
            .parse()
            .expect("Code is not numeric")
    }

    /// Registers a local account; returns the body and the refresh cookie.
    pub async fn register(&self, email: &str, username: &str) -> (AuthResult, Vec<String>) {
        let code = self.code_for(email).await;
        let response = self
            .post_json(
                &format!("/api/auth/register?code={}", code),
                &[],
                serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        (body_json(response).await, cookies)
    }
}

pub fn request(
    method: Method,
    uri: &str,
    cookies: &[String],
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "localhost:8080");
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies.join("; "));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request"),
        None => builder.body(Body::empty()).expect("Failed to build request"),
    }
}

pub fn bearer_request(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, authorization)
        .body(Body::empty())
        .expect("Failed to build request")
}

/// `name=value` pairs from every `Set-Cookie` header.
pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
        .collect()
}

/// Raw `Set-Cookie` header for `name`, attributes included.
pub fn set_cookie_header<B>(response: &Response<B>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

pub fn cookie_named(cookies: &[String], name: &str) -> Option<String> {
    cookies
        .iter()
        .find(|c| c.starts_with(&format!("{}=", name)))
        .cloned()
}

pub async fn body_json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not the expected JSON")
}
