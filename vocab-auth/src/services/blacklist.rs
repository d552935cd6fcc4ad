use chrono::Utc;
use std::sync::Arc;

use super::error::AuthError;
use super::redis::KeyValueStore;

/// Revoked access-token ids, each kept for one access-token lifetime.
#[derive(Clone)]
pub struct BlacklistService {
    store: Arc<dyn KeyValueStore>,
    ttl_seconds: u64,
}

impl BlacklistService {
    pub fn new(store: Arc<dyn KeyValueStore>, access_token_expire_in_seconds: i64) -> Self {
        Self {
            store,
            ttl_seconds: access_token_expire_in_seconds.max(1) as u64,
        }
    }

    fn key(jti: &str) -> String {
        format!("blacklist:{}", jti)
    }

    /// Revoke `jti`. Tokens whose `exp` already passed are left alone.
    pub async fn blacklist(&self, jti: &str, exp: i64) -> Result<(), AuthError> {
        if exp < Utc::now().timestamp() {
            return Ok(());
        }

        self.store
            .set_ex(&Self::key(jti), "0", self.ttl_seconds)
            .await
            .map_err(AuthError::Cache)?;
        tracing::debug!(jti, "Access token blacklisted");
        Ok(())
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        self.store
            .exists(&Self::key(jti))
            .await
            .map_err(AuthError::Cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redis::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_blacklist_live_token() {
        let store = Arc::new(MemoryStore::new());
        let service = BlacklistService::new(store.clone(), 900);

        service
            .blacklist("abc", Utc::now().timestamp() + 60)
            .await
            .unwrap();

        assert!(service.is_blacklisted("abc").await.unwrap());
        assert!(!service.is_blacklisted("other").await.unwrap());
        assert_eq!(store.get("blacklist:abc").await.unwrap().as_deref(), Some("0"));

        // Kept for a full access-token lifetime, not just the token's remaining one.
        let ttl = store.ttl("blacklist:abc").unwrap();
        assert!(ttl > Duration::from_secs(895) && ttl <= Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_expired_token_is_not_stored() {
        let service = BlacklistService::new(Arc::new(MemoryStore::new()), 900);
        service
            .blacklist("old", Utc::now().timestamp() - 60)
            .await
            .unwrap();
        assert!(!service.is_blacklisted("old").await.unwrap());
    }
}
