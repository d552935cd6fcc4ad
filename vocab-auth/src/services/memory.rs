use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    NewOAuthConnection, NewRefreshSession, NewUser, OAuthBackend, OAuthConnection,
    RefreshSession, User,
};

use super::error::StoreError;
use super::store::{default_expiry, OAuthConnectionStore, SessionStore, UserStore};

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_session_id: i64,
    users: Vec<User>,
    sessions: HashMap<Uuid, RefreshSession>,
    connections: HashMap<(String, OAuthBackend), OAuthConnection>,
}

/// In-process stand-in for the PostgreSQL stores.
///
/// Enforces the same unique constraints and keeps delete-returning atomic by
/// holding a single lock per call.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|e| {
            StoreError::Database(sqlx::Error::Protocol(format!(
                "Memory database mutex poisoned: {}",
                e
            )))
        })
    }

    /// Sessions currently stored for a user.
    pub fn sessions_for_user(&self, user_id: i64) -> Vec<RefreshSession> {
        self.tables()
            .map(|t| {
                t.sessions
                    .values()
                    .filter(|s| s.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.tables().map(|t| t.connections.len()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryDatabase {
    async fn create(&self, session: NewRefreshSession) -> Result<RefreshSession, StoreError> {
        let mut tables = self.tables()?;
        if tables.sessions.contains_key(&session.refresh_token) {
            return Err(StoreError::Conflict("refresh_sessions_refresh_token_key".into()));
        }
        if !tables.users.iter().any(|u| u.id == session.user_id) {
            return Err(StoreError::Conflict("refresh_sessions_user_id_fkey".into()));
        }

        tables.next_session_id += 1;
        let now = Utc::now();
        let row = RefreshSession {
            id: tables.next_session_id,
            refresh_token: session.refresh_token,
            access_token: session.access_token,
            user_id: session.user_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            created_at: now,
            updated_at: now,
            expires_at: session.expires_at,
        };
        tables.sessions.insert(row.refresh_token, row.clone());
        Ok(row)
    }

    async fn get_by_refresh_token(
        &self,
        refresh_token: Uuid,
    ) -> Result<RefreshSession, StoreError> {
        self.tables()?
            .sessions
            .get(&refresh_token)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_by_refresh_token(
        &self,
        refresh_token: Uuid,
    ) -> Result<RefreshSession, StoreError> {
        self.tables()?
            .sessions
            .remove(&refresh_token)
            .ok_or(StoreError::NotFound)
    }

    async fn expire(
        &self,
        refresh_token: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<RefreshSession, StoreError> {
        let mut tables = self.tables()?;
        let session = tables
            .sessions
            .get_mut(&refresh_token)
            .ok_or(StoreError::NotFound)?;
        session.expires_at = default_expiry(at);
        session.updated_at = Utc::now();
        Ok(session.clone())
    }
}

#[async_trait]
impl UserStore for MemoryDatabase {
    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.tables()?
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.tables()?
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables()?
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.tables()?.users.iter().any(|u| u.username == username))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("users_username_key".into()));
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let row = User {
            id: tables.next_user_id,
            email: user.email,
            username: user.username,
            hashed_password: user.hashed_password,
            is_active: true,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl OAuthConnectionStore for MemoryDatabase {
    async fn get_connection(
        &self,
        oauth_id: &str,
        backend: OAuthBackend,
    ) -> Result<OAuthConnection, StoreError> {
        self.tables()?
            .connections
            .get(&(oauth_id.to_string(), backend))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_connection(
        &self,
        connection: NewOAuthConnection,
    ) -> Result<OAuthConnection, StoreError> {
        let mut tables = self.tables()?;
        let key = (connection.oauth_id.clone(), connection.backend);
        if tables.connections.contains_key(&key) {
            return Err(StoreError::Conflict("oauth_connections_pkey".into()));
        }
        let backend = connection.backend.as_str();
        if tables
            .connections
            .values()
            .any(|c| c.user_id == connection.user_id && c.backend == backend)
        {
            return Err(StoreError::Conflict(
                "oauth_connections_user_id_backend_key".into(),
            ));
        }

        let now = Utc::now();
        let row = OAuthConnection {
            oauth_id: connection.oauth_id,
            backend: backend.to_string(),
            email: connection.email,
            detail: connection.detail,
            user_id: connection.user_id,
            created_at: now,
            updated_at: now,
        };
        tables.connections.insert(key, row.clone());
        Ok(row)
    }
}
