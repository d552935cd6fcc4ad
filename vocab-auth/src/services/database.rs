//! PostgreSQL stores for users, refresh sessions and OAuth connections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    NewOAuthConnection, NewRefreshSession, NewUser, OAuthBackend, OAuthConnection,
    RefreshSession, User,
};

use super::error::StoreError;
use super::store::{default_expiry, OAuthConnectionStore, SessionStore, UserStore};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        crate::db::health_check(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StoreError::Database(e)
        })
    }
}

// ==================== Refresh Session Operations ====================

#[async_trait]
impl SessionStore for Database {
    async fn create(&self, session: NewRefreshSession) -> Result<RefreshSession, StoreError> {
        sqlx::query_as::<_, RefreshSession>(
            r#"
            INSERT INTO refresh_sessions
                (refresh_token, access_token, user_id, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(session.refresh_token)
        .bind(&session.access_token)
        .bind(session.user_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn get_by_refresh_token(
        &self,
        refresh_token: Uuid,
    ) -> Result<RefreshSession, StoreError> {
        sqlx::query_as::<_, RefreshSession>(
            "SELECT * FROM refresh_sessions WHERE refresh_token = $1",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_by_refresh_token(
        &self,
        refresh_token: Uuid,
    ) -> Result<RefreshSession, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let session = sqlx::query_as::<_, RefreshSession>(
            "DELETE FROM refresh_sessions WHERE refresh_token = $1 RETURNING *",
        )
        .bind(refresh_token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        session.ok_or(StoreError::NotFound)
    }

    async fn expire(
        &self,
        refresh_token: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<RefreshSession, StoreError> {
        sqlx::query_as::<_, RefreshSession>(
            r#"
            UPDATE refresh_sessions SET expires_at = $2, updated_at = NOW()
            WHERE refresh_token = $1
            RETURNING *
            "#,
        )
        .bind(refresh_token)
        .bind(default_expiry(at))
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or(StoreError::NotFound)
    }
}

// ==================== User Operations ====================

#[async_trait]
impl UserStore for Database {
    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .ok_or(StoreError::NotFound)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, hashed_password)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}

// ==================== OAuth Connection Operations ====================

#[async_trait]
impl OAuthConnectionStore for Database {
    async fn get_connection(
        &self,
        oauth_id: &str,
        backend: OAuthBackend,
    ) -> Result<OAuthConnection, StoreError> {
        sqlx::query_as::<_, OAuthConnection>(
            "SELECT * FROM oauth_connections WHERE oauth_id = $1 AND backend = $2",
        )
        .bind(oauth_id)
        .bind(backend.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or(StoreError::NotFound)
    }

    async fn create_connection(
        &self,
        connection: NewOAuthConnection,
    ) -> Result<OAuthConnection, StoreError> {
        sqlx::query_as::<_, OAuthConnection>(
            r#"
            INSERT INTO oauth_connections (oauth_id, backend, email, detail, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&connection.oauth_id)
        .bind(connection.backend.as_str())
        .bind(&connection.email)
        .bind(&connection.detail)
        .bind(connection.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}
