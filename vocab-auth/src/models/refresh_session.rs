//! Refresh session model - one row per issued refresh token.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh session entity.
///
/// Rows are never updated in place: a refresh consumes the row and a new one
/// is inserted.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub id: i64,
    pub refresh_token: Uuid,
    pub access_token: String,
    pub user_id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshSession {
    /// Check if session is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Insert payload for a refresh session.
#[derive(Debug, Clone)]
pub struct NewRefreshSession {
    pub refresh_token: Uuid,
    pub access_token: String,
    pub user_id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub expires_at: DateTime<Utc>,
}

impl NewRefreshSession {
    pub fn new(
        access_token: String,
        user_id: i64,
        ip_address: String,
        user_agent: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            refresh_token: Uuid::new_v4(),
            access_token,
            user_id,
            ip_address,
            user_agent,
            expires_at,
        }
    }
}
