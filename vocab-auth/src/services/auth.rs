use crate::dtos::{AuthResult, UserInCreate, UserInLogin};
use crate::utils::client::ClientInfo;

use super::authenticator::Authenticator;
use super::error::AuthError;
use super::user::UserService;
use super::verification::VerificationService;

/// Email/password flows composed from the identity, verification and
/// credential services.
#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    verification: VerificationService,
    authenticator: Authenticator,
}

impl AuthService {
    pub fn new(
        users: UserService,
        verification: VerificationService,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            users,
            verification,
            authenticator,
        }
    }

    /// Registers a user behind a mailed verification code, then signs them in.
    #[tracing::instrument(skip(self, payload, client))]
    pub async fn register(
        &self,
        payload: &UserInCreate,
        code: u32,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        if !self.verification.verify(&payload.email, code).await? {
            return Err(AuthError::ActionRequiresVerification);
        }

        let user = self.users.create(payload).await?;
        self.verification.delete(&payload.email).await?;
        self.authenticator.authenticate(&user, client).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        payload: &UserInLogin,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let user = self.users.verify(payload).await?;
        self.authenticator.authenticate(&user, client).await
    }

    /// Rotates a refresh session: the old one is consumed and its access token
    /// revoked before new credentials are issued.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let session = self
            .authenticator
            .validate_refresh_session(refresh_token)
            .await?;
        self.authenticator
            .blacklist_access_token(&session.access_token)
            .await?;

        let user = self.users.get(session.user_id).await?;
        self.authenticator.authenticate(&user, client).await
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.authenticator.deauthenticate(refresh_token).await
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }
}
