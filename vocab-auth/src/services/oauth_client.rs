//! Provider side of the OAuth flow: authorize URLs, code exchange and userinfo.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{OAuthClientConfig, OAuthConfig};
use crate::models::{OAuthBackend, OAuthUser};

use super::error::AuthError;

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the browser is sent to for consent.
    fn authorization_url(
        &self,
        backend: OAuthBackend,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, AuthError>;

    /// Exchanges an authorization code and fetches the external identity.
    async fn fetch_user(
        &self,
        backend: OAuthBackend,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthUser, AuthError>;
}

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    userinfo: &'static str,
    scope: &'static str,
}

const GOOGLE: Endpoints = Endpoints {
    authorize: "https://accounts.google.com/o/oauth2/v2/auth",
    token: "https://oauth2.googleapis.com/token",
    userinfo: "https://openidconnect.googleapis.com/v1/userinfo",
    scope: "openid email profile",
};

const DISCORD: Endpoints = Endpoints {
    authorize: "https://discord.com/api/oauth2/authorize",
    token: "https://discord.com/api/oauth2/token",
    userinfo: "https://discord.com/api/users/@me",
    scope: "identify email",
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordUserInfo {
    id: String,
    email: Option<String>,
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

/// HTTP client for the supported providers.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: &OAuthConfig) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn endpoints(backend: OAuthBackend) -> &'static Endpoints {
        match backend {
            OAuthBackend::Google => &GOOGLE,
            OAuthBackend::Discord => &DISCORD,
        }
    }

    fn credentials(&self, backend: OAuthBackend) -> Result<&OAuthClientConfig, AuthError> {
        let creds = match backend {
            OAuthBackend::Google => &self.config.google,
            OAuthBackend::Discord => &self.config.discord,
        };
        if creds.client_id.is_empty() {
            return Err(AuthError::OAuthProtocol(format!(
                "{} OAuth client is not configured",
                backend
            )));
        }
        Ok(creds)
    }

    async fn exchange_code(
        &self,
        backend: OAuthBackend,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let creds = self.credentials(backend)?;
        let response = self
            .http
            .post(Self::endpoints(backend).token)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                AuthError::OAuthProtocol(format!("Failed to contact {}: {}", backend, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%backend, %status, body = %body, "Token exchange rejected");
            return Err(AuthError::OAuthProtocol(format!(
                "{} token exchange failed with status {}",
                backend, status
            )));
        }

        let tokens = response.json::<TokenResponse>().await.map_err(|e| {
            AuthError::OAuthProtocol(format!("Failed to parse {} token response: {}", backend, e))
        })?;
        Ok(tokens.access_token)
    }

    async fn userinfo<T: serde::de::DeserializeOwned>(
        &self,
        backend: OAuthBackend,
        access_token: &str,
    ) -> Result<T, AuthError> {
        self.http
            .get(Self::endpoints(backend).userinfo)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::OAuthProtocol(format!("{} userinfo failed: {}", backend, e)))?
            .json::<T>()
            .await
            .map_err(|e| {
                AuthError::OAuthProtocol(format!("Failed to parse {} userinfo: {}", backend, e))
            })
    }
}

fn require_email(backend: OAuthBackend, email: Option<String>) -> Result<String, AuthError> {
    email.filter(|e| !e.is_empty()).ok_or_else(|| {
        AuthError::OAuthProtocol(format!("{} account does not expose an email", backend))
    })
}

#[async_trait]
impl OAuthProvider for OAuthClient {
    fn authorization_url(
        &self,
        backend: OAuthBackend,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, AuthError> {
        let creds = self.credentials(backend)?;
        let endpoints = Self::endpoints(backend);
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            endpoints.authorize,
            urlencoding::encode(&creds.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(endpoints.scope),
            urlencoding::encode(state),
        ))
    }

    #[tracing::instrument(skip(self, code, redirect_uri))]
    async fn fetch_user(
        &self,
        backend: OAuthBackend,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthUser, AuthError> {
        let access_token = self.exchange_code(backend, code, redirect_uri).await?;

        match backend {
            OAuthBackend::Google => {
                let info: GoogleUserInfo = self.userinfo(backend, &access_token).await?;
                let email = require_email(backend, info.email)?;
                Ok(OAuthUser {
                    id: info.sub,
                    detail: info.name.unwrap_or_else(|| email.clone()),
                    email,
                    is_email_taken: None,
                })
            }
            OAuthBackend::Discord => {
                let info: DiscordUserInfo = self.userinfo(backend, &access_token).await?;
                let email = require_email(backend, info.email)?;
                let detail = match info.discriminator.as_deref() {
                    Some(d) if !d.is_empty() => format!("{}#{}", info.username, d),
                    _ => info.username,
                };
                Ok(OAuthUser {
                    id: info.id,
                    email,
                    detail,
                    is_email_taken: None,
                })
            }
        }
    }
}

/// Provider double keyed by authorization code.
#[derive(Default)]
pub struct MockOAuthProvider {
    users: Mutex<HashMap<String, OAuthUser>>,
}

impl MockOAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `code` resolve to `user`.
    pub fn with_user(self, code: &str, user: OAuthUser) -> Self {
        if let Ok(mut users) = self.users.lock() {
            users.insert(code.to_string(), user);
        }
        self
    }
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    fn authorization_url(
        &self,
        backend: OAuthBackend,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, AuthError> {
        Ok(format!(
            "https://oauth.test/{}/authorize?redirect_uri={}&state={}",
            backend,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        ))
    }

    async fn fetch_user(
        &self,
        _backend: OAuthBackend,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<OAuthUser, AuthError> {
        self.users
            .lock()
            .map_err(|e| {
                AuthError::Internal(anyhow::anyhow!("Mock provider mutex poisoned: {}", e))
            })?
            .get(code)
            .cloned()
            .ok_or_else(|| AuthError::OAuthProtocol("invalid authorization code".to_string()))
    }
}
