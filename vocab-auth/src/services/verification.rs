use rand::{rngs::OsRng, Rng};
use std::sync::Arc;

use super::error::AuthError;
use super::redis::KeyValueStore;

const MIN_CODE: u32 = 1;
const MAX_CODE: u32 = 999_999;

/// One-time email verification codes kept in the key-value store.
///
/// At most one code is outstanding per email; asking again before it expires
/// hands back the same code.
#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn KeyValueStore>,
    expire_in_seconds: u64,
}

impl VerificationService {
    pub fn new(store: Arc<dyn KeyValueStore>, expire_in_seconds: i64) -> Self {
        Self {
            store,
            expire_in_seconds: expire_in_seconds.max(1) as u64,
        }
    }

    fn key(email: &str) -> String {
        format!("verification:{}", email.trim().to_lowercase())
    }

    /// Zero-padded six digit rendering of a code.
    pub fn format_code(code: u32) -> String {
        format!("{:06}", code)
    }

    /// Returns the outstanding code for `email`, creating one if none exists.
    #[tracing::instrument(skip(self, email))]
    pub async fn get_or_create(&self, email: &str) -> Result<String, AuthError> {
        let key = Self::key(email);

        if let Some(code) = self.stored_code(&key).await? {
            return Ok(Self::format_code(code));
        }

        let code = OsRng.gen_range(MIN_CODE..=MAX_CODE);
        let written = self
            .store
            .set_nx_ex(&key, &code.to_string(), self.expire_in_seconds)
            .await
            .map_err(AuthError::Cache)?;

        if written {
            tracing::info!("Verification code issued");
            return Ok(Self::format_code(code));
        }

        // Lost a race with a concurrent request; hand out the winner's code.
        match self.stored_code(&key).await? {
            Some(existing) => Ok(Self::format_code(existing)),
            None => Ok(Self::format_code(code)),
        }
    }

    /// Whether `code` matches the outstanding code. Never consumes it.
    pub async fn verify(&self, email: &str, code: u32) -> Result<bool, AuthError> {
        let stored = self.stored_code(&Self::key(email)).await?;
        Ok(stored == Some(code))
    }

    pub async fn delete(&self, email: &str) -> Result<(), AuthError> {
        self.store
            .delete(&Self::key(email))
            .await
            .map_err(AuthError::Cache)
    }

    async fn stored_code(&self, key: &str) -> Result<Option<u32>, AuthError> {
        let raw = self.store.get(key).await.map_err(AuthError::Cache)?;
        Ok(raw.and_then(|value| value.parse().ok()))
    }
}
