use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::{AuthResult, CredentialsInResponse};
use crate::models::{NewRefreshSession, RefreshSession, User};
use crate::utils::client::ClientInfo;

use super::blacklist::BlacklistService;
use super::error::{AuthError, StoreError};
use super::jwt::{AccessClaims, JwtService};
use super::store::SessionStore;

/// Issues and retires credentials: access tokens plus refresh sessions.
///
/// Transport-free; handlers move the refresh token in and out of cookies.
#[derive(Clone)]
pub struct Authenticator {
    jwt: JwtService,
    blacklist: BlacklistService,
    sessions: Arc<dyn SessionStore>,
    refresh_token_expire_in_seconds: i64,
}

impl Authenticator {
    pub fn new(
        jwt: JwtService,
        blacklist: BlacklistService,
        sessions: Arc<dyn SessionStore>,
        refresh_token_expire_in_seconds: i64,
    ) -> Self {
        Self {
            jwt,
            blacklist,
            sessions,
            refresh_token_expire_in_seconds,
        }
    }

    pub fn refresh_token_expire_in_seconds(&self) -> i64 {
        self.refresh_token_expire_in_seconds
    }

    /// Mints an access token and opens a refresh session for `user`.
    #[tracing::instrument(skip(self, user, client), fields(user_id = user.id))]
    pub async fn authenticate(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let access_token = self.jwt.generate(user)?;
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expire_in_seconds);

        let session = self
            .sessions
            .create(NewRefreshSession::new(
                access_token.clone(),
                user.id,
                client.ip_address.clone(),
                client.user_agent.clone(),
                expires_at,
            ))
            .await?;

        tracing::info!(session_id = session.id, "Refresh session created");

        Ok(AuthResult {
            credentials: CredentialsInResponse::bearer(
                access_token,
                self.jwt.access_token_expiry_seconds(),
                session.refresh_token.to_string(),
            ),
            user: user.sanitized(),
        })
    }

    /// Ends the session behind `refresh_token` and revokes its access token.
    #[tracing::instrument(skip_all)]
    pub async fn deauthenticate(&self, refresh_token: &str) -> Result<(), AuthError> {
        let session = self.validate_refresh_session(refresh_token).await?;
        self.blacklist_access_token(&session.access_token).await?;
        tracing::info!(user_id = session.user_id, "Refresh session closed");
        Ok(())
    }

    /// Consumes the session. The row is deleted before the expiry check, so an
    /// expired token is gone after the first attempt.
    pub async fn validate_refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshSession, AuthError> {
        let token =
            Uuid::parse_str(refresh_token.trim()).map_err(|_| AuthError::SessionDoesNotExist)?;

        let session = self
            .sessions
            .delete_by_refresh_token(token)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::SessionDoesNotExist,
                other => AuthError::Store(other),
            })?;

        if session.is_expired() {
            tracing::debug!(session_id = session.id, "Refresh session expired");
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    /// Revokes an access token. Already-expired tokens need no entry.
    pub async fn blacklist_access_token(&self, access_token: &str) -> Result<(), AuthError> {
        match self.jwt.verify(access_token) {
            Ok(claims) => self.blacklist.blacklist(&claims.jti, claims.exp).await,
            Err(AuthError::TokenExpired) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Verifies a presented access token and rejects revoked ones.
    pub async fn authorize(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.jwt.verify(access_token)?;
        if self.blacklist.is_blacklisted(&claims.jti).await? {
            return Err(AuthError::TokenBlacklisted);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::models::NewUser;
    use crate::services::{memory::MemoryDatabase, redis::MemoryStore, store::UserStore};

    struct Fixture {
        authenticator: Authenticator,
        db: Arc<MemoryDatabase>,
        jwt: JwtService,
        blacklist: BlacklistService,
        kv: Arc<MemoryStore>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let config = test_config();
        let db = Arc::new(MemoryDatabase::new());
        let jwt = JwtService::new(&config.jwt);
        let kv = Arc::new(MemoryStore::new());
        let blacklist =
            BlacklistService::new(kv.clone(), config.jwt.access_token_expire_in_seconds);
        let user = db
            .create_user(NewUser {
                email: "reader@vocab.io".into(),
                username: "reader_one".into(),
                hashed_password: "hash".into(),
            })
            .await
            .unwrap();
        let authenticator = Authenticator::new(
            jwt.clone(),
            blacklist.clone(),
            db.clone(),
            config.jwt.refresh_token_expire_in_seconds,
        );
        Fixture {
            authenticator,
            db,
            jwt,
            blacklist,
            kv,
            user,
        }
    }

    fn client() -> ClientInfo {
        ClientInfo::new("127.0.0.1", "unit-test")
    }

    #[tokio::test]
    async fn test_authenticate_creates_session() {
        let f = fixture().await;
        let result = f.authenticator.authenticate(&f.user, &client()).await.unwrap();

        assert_eq!(result.credentials.token_type, "Bearer");
        assert_eq!(result.credentials.expires_in, 900);
        assert_eq!(result.user.id, f.user.id);

        let sessions = f.db.sessions_for_user(f.user.id);
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.refresh_token.to_string(), result.credentials.refresh_token);
        assert_eq!(session.access_token, result.credentials.access_token);
        assert_eq!(session.ip_address, "127.0.0.1");
        let lifetime = (session.expires_at - session.created_at).num_seconds();
        assert!((lifetime - 3600).abs() <= 10);
    }

    #[tokio::test]
    async fn test_validate_consumes_session() {
        let f = fixture().await;
        let result = f.authenticator.authenticate(&f.user, &client()).await.unwrap();
        let token = result.credentials.refresh_token;

        assert!(f.authenticator.validate_refresh_session(&token).await.is_ok());
        assert!(matches!(
            f.authenticator.validate_refresh_session(&token).await,
            Err(AuthError::SessionDoesNotExist)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed_without_revocation() {
        let f = fixture().await;
        let result = f.authenticator.authenticate(&f.user, &client()).await.unwrap();
        let token = Uuid::parse_str(&result.credentials.refresh_token).unwrap();
        f.db.expire(token, None).await.unwrap();

        assert!(matches!(
            f.authenticator.deauthenticate(&token.to_string()).await,
            Err(AuthError::SessionExpired)
        ));
        assert!(matches!(
            f.authenticator.deauthenticate(&token.to_string()).await,
            Err(AuthError::SessionDoesNotExist)
        ));

        let claims = f.jwt.verify(&result.credentials.access_token).unwrap();
        assert!(!f.blacklist.is_blacklisted(&claims.jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_deauthenticate_revokes_access_token() {
        let f = fixture().await;
        let result = f.authenticator.authenticate(&f.user, &client()).await.unwrap();

        f.authenticator
            .deauthenticate(&result.credentials.refresh_token)
            .await
            .unwrap();

        assert!(matches!(
            f.authenticator.authorize(&result.credentials.access_token).await,
            Err(AuthError::TokenBlacklisted)
        ));
    }

    #[tokio::test]
    async fn test_revocation_outlives_the_token() {
        let f = fixture().await;
        let result = f.authenticator.authenticate(&f.user, &client()).await.unwrap();
        let claims = f.jwt.verify(&result.credentials.access_token).unwrap();

        f.authenticator
            .blacklist_access_token(&result.credentials.access_token)
            .await
            .unwrap();

        let ttl = f.kv.ttl(&format!("blacklist:{}", claims.jti)).unwrap();
        assert!(ttl > std::time::Duration::from_secs(895));
        assert!(ttl.as_secs() as i64 + 1 >= claims.exp - Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_garbage_refresh_token_does_not_exist() {
        let f = fixture().await;
        assert!(matches!(
            f.authenticator.validate_refresh_session("not-a-uuid").await,
            Err(AuthError::SessionDoesNotExist)
        ));
    }

    #[tokio::test]
    async fn test_blacklisting_expired_token_is_noop() {
        let f = fixture().await;
        let expired = f
            .jwt
            .generate_with_lifetime(&f.user, Duration::seconds(-30))
            .unwrap();
        assert!(f.authenticator.blacklist_access_token(&expired).await.is_ok());
        assert!(matches!(
            f.authenticator.blacklist_access_token("garbage").await,
            Err(AuthError::TokenMalformed)
        ));
    }

    #[tokio::test]
    async fn test_authorize_accepts_fresh_token() {
        let f = fixture().await;
        let result = f.authenticator.authenticate(&f.user, &client()).await.unwrap();
        let claims = f
            .authenticator
            .authorize(&result.credentials.access_token)
            .await
            .unwrap();
        assert_eq!(claims.id, f.user.id);
    }
}
