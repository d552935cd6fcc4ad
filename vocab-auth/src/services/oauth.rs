//! Sign-in through an external provider and linking of external identities
//! to local accounts.
//!
//! The provider identity returned by the callback is parked in the caller's
//! request session until it is either linked to an existing account or used
//! to register a new one.

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::sync::Arc;

use crate::dtos::{AuthResult, CallbackParams, UserInCreate, UserInLogin, UserInOAuthCreate};
use crate::models::{NewOAuthConnection, OAuthBackend, OAuthUser, User};
use crate::utils::client::ClientInfo;
use crate::utils::session::RequestSession;

use super::authenticator::Authenticator;
use super::error::{AuthError, StoreError};
use super::oauth_client::OAuthProvider;
use super::store::OAuthConnectionStore;
use super::user::UserService;

const STATE_LENGTH: usize = 32;

/// Result of a provider callback.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// The external identity was already linked; the user is signed in.
    Authenticated(AuthResult),
    /// An account with the provider email exists and must be signed into to link.
    LinkRequired { email: String },
    /// No matching account: the caller may link any account or register.
    LinkOrRegister,
}

#[derive(Clone)]
pub struct OAuthService {
    provider: Arc<dyn OAuthProvider>,
    connections: Arc<dyn OAuthConnectionStore>,
    users: UserService,
    authenticator: Authenticator,
}

impl OAuthService {
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        connections: Arc<dyn OAuthConnectionStore>,
        users: UserService,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            provider,
            connections,
            users,
            authenticator,
        }
    }

    /// Builds the consent URL and remembers a fresh CSRF state in the session.
    pub fn authorization_url(
        &self,
        backend: OAuthBackend,
        redirect_uri: &str,
        session: &mut dyn RequestSession,
    ) -> Result<String, AuthError> {
        let state: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect();
        session.insert_as(&backend.state_key(), &state)?;
        self.provider.authorization_url(backend, redirect_uri, &state)
    }

    #[tracing::instrument(skip(self, params, redirect_uri, session, client))]
    pub async fn callback(
        &self,
        backend: OAuthBackend,
        params: CallbackParams,
        redirect_uri: &str,
        session: &mut dyn RequestSession,
        client: &ClientInfo,
    ) -> Result<CallbackOutcome, AuthError> {
        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            tracing::warn!(%error, %description, "Provider returned an error");
            let message = format!("{} {}", error, description).trim().to_string();
            return Err(AuthError::OAuthProtocol(message));
        }

        let expected = session
            .remove(&backend.state_key())
            .and_then(|v| v.as_str().map(str::to_string));
        match (expected, params.state) {
            (Some(expected), Some(actual)) if expected == actual => {}
            _ => return Err(AuthError::OAuthProtocol("state mismatch".to_string())),
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::OAuthProtocol("missing authorization code".to_string()))?;

        let mut oauth_user = self.provider.fetch_user(backend, &code, redirect_uri).await?;

        match self.login(backend, &oauth_user, client).await {
            Ok(result) => return Ok(CallbackOutcome::Authenticated(result)),
            Err(AuthError::OAuthConnectionDoesNotExist) => {}
            Err(e) => return Err(e),
        }

        let is_email_taken = self.users.email_exists(&oauth_user.email).await?;
        oauth_user.is_email_taken = Some(is_email_taken);
        session.insert_as(&backend.session_key(), &oauth_user)?;

        tracing::info!(is_email_taken, "External identity is waiting for a local account");

        if is_email_taken {
            Ok(CallbackOutcome::LinkRequired {
                email: oauth_user.email,
            })
        } else {
            Ok(CallbackOutcome::LinkOrRegister)
        }
    }

    /// Links the pending identity to the account the caller signs into.
    #[tracing::instrument(skip(self, payload, session, client))]
    pub async fn link(
        &self,
        backend: OAuthBackend,
        payload: &UserInLogin,
        session: &mut dyn RequestSession,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let oauth_user = pending_identity(session, backend)?;

        if oauth_user.is_email_taken.unwrap_or(false)
            && !oauth_user.email.eq_ignore_ascii_case(payload.email.trim())
        {
            return Err(AuthError::OAuthLinkingWhenAccountWithSuchEmailExists);
        }

        let user = self.users.verify(payload).await?;
        self.connect(backend, &oauth_user, &user).await?;
        session.remove(&backend.session_key());

        self.authenticator.authenticate(&user, client).await
    }

    /// Creates a local account for the pending identity and links it.
    #[tracing::instrument(skip(self, payload, session, client))]
    pub async fn register(
        &self,
        backend: OAuthBackend,
        payload: &UserInOAuthCreate,
        session: &mut dyn RequestSession,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let oauth_user = pending_identity(session, backend)?;

        let user = self
            .users
            .create(&UserInCreate {
                email: oauth_user.email.clone(),
                username: payload.username.clone(),
                password: payload.password.clone(),
            })
            .await?;
        self.connect(backend, &oauth_user, &user).await?;
        session.remove(&backend.session_key());

        self.authenticator.authenticate(&user, client).await
    }

    /// Signs in the account already linked to `oauth_user`.
    pub async fn login(
        &self,
        backend: OAuthBackend,
        oauth_user: &OAuthUser,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let connection = self
            .connections
            .get_connection(&oauth_user.id, backend)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::OAuthConnectionDoesNotExist,
                other => AuthError::Store(other),
            })?;

        let user = self.users.get(connection.user_id).await?;
        self.authenticator.authenticate(&user, client).await
    }

    async fn connect(
        &self,
        backend: OAuthBackend,
        oauth_user: &OAuthUser,
        user: &User,
    ) -> Result<(), AuthError> {
        self.connections
            .create_connection(NewOAuthConnection {
                oauth_id: oauth_user.id.clone(),
                backend,
                email: oauth_user.email.clone(),
                detail: oauth_user.detail.clone(),
                user_id: user.id,
            })
            .await?;
        tracing::info!(user_id = user.id, %backend, "OAuth connection created");
        Ok(())
    }
}

fn pending_identity(
    session: &dyn RequestSession,
    backend: OAuthBackend,
) -> Result<OAuthUser, AuthError> {
    session
        .get_as::<OAuthUser>(&backend.session_key())
        .ok_or(AuthError::OAuthUserIsNotInSession)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::services::{
        blacklist::BlacklistService, jwt::JwtService, memory::MemoryDatabase,
        oauth_client::MockOAuthProvider, redis::MemoryStore,
    };
    use crate::utils::session::CookieSession;

    struct Fixture {
        service: OAuthService,
        users: UserService,
        db: Arc<MemoryDatabase>,
    }

    fn google_user() -> OAuthUser {
        OAuthUser {
            id: "google-42".into(),
            email: "reader@vocab.io".into(),
            detail: "Reader".into(),
            is_email_taken: None,
        }
    }

    fn fixture() -> Fixture {
        let config = test_config();
        let db = Arc::new(MemoryDatabase::new());
        let authenticator = Authenticator::new(
            JwtService::new(&config.jwt),
            BlacklistService::new(
                Arc::new(MemoryStore::new()),
                config.jwt.access_token_expire_in_seconds,
            ),
            db.clone(),
            config.jwt.refresh_token_expire_in_seconds,
        );
        let users = UserService::new(db.clone());
        let provider = MockOAuthProvider::new().with_user("good-code", google_user());
        let service =
            OAuthService::new(Arc::new(provider), db.clone(), users.clone(), authenticator);
        Fixture { service, users, db }
    }

    fn client() -> ClientInfo {
        ClientInfo::new("127.0.0.1", "unit-test")
    }

    fn login(email: &str) -> UserInLogin {
        UserInLogin {
            email: email.into(),
            password: "correct horse".into(),
        }
    }

    async fn create_local(users: &UserService, email: &str, username: &str) -> User {
        users
            .create(&UserInCreate {
                email: email.into(),
                username: username.into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap()
    }

    /// Runs redirect + callback with a matching state.
    async fn run_callback(
        f: &Fixture,
        session: &mut CookieSession,
    ) -> Result<CallbackOutcome, AuthError> {
        let url = f
            .service
            .authorization_url(OAuthBackend::Google, "http://cb", session)
            .unwrap();
        let state = url.rsplit("state=").next().unwrap().to_string();
        f.service
            .callback(
                OAuthBackend::Google,
                CallbackParams {
                    code: Some("good-code".into()),
                    state: Some(state),
                    ..Default::default()
                },
                "http://cb",
                session,
                &client(),
            )
            .await
    }

    #[tokio::test]
    async fn test_callback_without_account_offers_link_or_register() {
        let f = fixture();
        let mut session = CookieSession::default();

        let outcome = run_callback(&f, &mut session).await.unwrap();
        assert!(matches!(outcome, CallbackOutcome::LinkOrRegister));

        let dynamic: &dyn RequestSession = &session;
        let pending: OAuthUser = dynamic.get_as("oauth_google").unwrap();
        assert_eq!(pending.is_email_taken, Some(false));
        assert!(dynamic.get("oauth_state_google").is_none());
    }

    #[tokio::test]
    async fn test_callback_with_taken_email_requires_link() {
        let f = fixture();
        create_local(&f.users, "reader@vocab.io", "reader_one").await;
        let mut session = CookieSession::default();

        match run_callback(&f, &mut session).await.unwrap() {
            CallbackOutcome::LinkRequired { email } => assert_eq!(email, "reader@vocab.io"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected() {
        let f = fixture();
        let mut session = CookieSession::default();
        f.service
            .authorization_url(OAuthBackend::Google, "http://cb", &mut session)
            .unwrap();

        let result = f
            .service
            .callback(
                OAuthBackend::Google,
                CallbackParams {
                    code: Some("good-code".into()),
                    state: Some("forged".into()),
                    ..Default::default()
                },
                "http://cb",
                &mut session,
                &client(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::OAuthProtocol(_))));
    }

    #[tokio::test]
    async fn test_provider_error_is_rejected() {
        let f = fixture();
        let mut session = CookieSession::default();
        let result = f
            .service
            .callback(
                OAuthBackend::Google,
                CallbackParams {
                    error: Some("access_denied".into()),
                    ..Default::default()
                },
                "http://cb",
                &mut session,
                &client(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::OAuthProtocol(_))));
    }

    #[tokio::test]
    async fn test_link_then_callback_authenticates() {
        let f = fixture();
        let user = create_local(&f.users, "reader@vocab.io", "reader_one").await;
        let mut session = CookieSession::default();
        run_callback(&f, &mut session).await.unwrap();

        let result = f
            .service
            .link(OAuthBackend::Google, &login("reader@vocab.io"), &mut session, &client())
            .await
            .unwrap();
        assert_eq!(result.user.id, user.id);
        assert_eq!(f.db.connection_count(), 1);

        let dynamic: &dyn RequestSession = &session;
        assert!(dynamic.get("oauth_google").is_none());

        match run_callback(&f, &mut session).await.unwrap() {
            CallbackOutcome::Authenticated(result) => assert_eq!(result.user.id, user.id),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_link_without_pending_identity() {
        let f = fixture();
        let mut session = CookieSession::default();
        assert!(matches!(
            f.service
                .link(OAuthBackend::Google, &login("reader@vocab.io"), &mut session, &client())
                .await,
            Err(AuthError::OAuthUserIsNotInSession)
        ));
    }

    #[tokio::test]
    async fn test_link_with_taken_email_and_other_account_collides() {
        let f = fixture();
        create_local(&f.users, "reader@vocab.io", "reader_one").await;
        let mut session = CookieSession::default();
        run_callback(&f, &mut session).await.unwrap();

        // No such account: the collision must be reported before any login.
        assert!(matches!(
            f.service
                .link(OAuthBackend::Google, &login("other@vocab.io"), &mut session, &client())
                .await,
            Err(AuthError::OAuthLinkingWhenAccountWithSuchEmailExists)
        ));
        assert_eq!(f.db.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_link_with_wrong_password_surfaces_login_error() {
        let f = fixture();
        create_local(&f.users, "reader@vocab.io", "reader_one").await;
        let mut session = CookieSession::default();
        run_callback(&f, &mut session).await.unwrap();

        let err = f
            .service
            .link(
                OAuthBackend::Google,
                &UserInLogin {
                    email: "reader@vocab.io".into(),
                    password: "wrong".into(),
                },
                &mut session,
                &client(),
            )
            .await
            .unwrap_err();
        assert!(err.is_login_error());
    }

    #[tokio::test]
    async fn test_register_creates_linked_account() {
        let f = fixture();
        let mut session = CookieSession::default();
        run_callback(&f, &mut session).await.unwrap();

        let result = f
            .service
            .register(
                OAuthBackend::Google,
                &UserInOAuthCreate {
                    username: "reader_one".into(),
                    password: "correct horse".into(),
                },
                &mut session,
                &client(),
            )
            .await
            .unwrap();
        assert_eq!(result.user.email, "reader@vocab.io");
        assert_eq!(f.db.connection_count(), 1);

        assert!(matches!(
            f.service
                .register(
                    OAuthBackend::Google,
                    &UserInOAuthCreate {
                        username: "reader_two".into(),
                        password: "correct horse".into(),
                    },
                    &mut session,
                    &client(),
                )
                .await,
            Err(AuthError::OAuthUserIsNotInSession)
        ));
    }

    #[tokio::test]
    async fn test_login_without_connection() {
        let f = fixture();
        assert!(matches!(
            f.service
                .login(OAuthBackend::Discord, &google_user(), &client())
                .await,
            Err(AuthError::OAuthConnectionDoesNotExist)
        ));
    }
}
