//! Persistence seams of the auth core.
//!
//! Every call is its own unit of work. Implementations: [`super::Database`]
//! (PostgreSQL) and [`super::MemoryDatabase`] (in-process).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    NewOAuthConnection, NewRefreshSession, NewUser, OAuthBackend, OAuthConnection,
    RefreshSession, User,
};

use super::error::StoreError;

/// Default back-dating applied by [`SessionStore::expire`].
pub const EXPIRE_BACKDATE_SECONDS: i64 = 5;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: NewRefreshSession) -> Result<RefreshSession, StoreError>;

    async fn get_by_refresh_token(&self, refresh_token: Uuid)
        -> Result<RefreshSession, StoreError>;

    /// Atomically removes the session and returns the removed row.
    async fn delete_by_refresh_token(
        &self,
        refresh_token: Uuid,
    ) -> Result<RefreshSession, StoreError>;

    /// Moves `expires_at` to `at`, or to five seconds ago when `None`.
    async fn expire(
        &self,
        refresh_token: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<RefreshSession, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError>;

    /// Case-insensitive lookup.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    /// Inserts a user; unique violations surface as `StoreError::Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
}

#[async_trait]
pub trait OAuthConnectionStore: Send + Sync {
    async fn get_connection(
        &self,
        oauth_id: &str,
        backend: OAuthBackend,
    ) -> Result<OAuthConnection, StoreError>;

    async fn create_connection(
        &self,
        connection: NewOAuthConnection,
    ) -> Result<OAuthConnection, StoreError>;
}

pub(crate) fn default_expiry(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or_else(|| Utc::now() - chrono::Duration::seconds(EXPIRE_BACKDATE_SECONDS))
}
