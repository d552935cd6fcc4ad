//! OAuth models - supported backends, stored connections and the pending
//! identity kept in the browser session between callback and link/register.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// OAuth backend codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OAuthBackend {
    Google,
    Discord,
}

impl OAuthBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthBackend::Google => "google",
            OAuthBackend::Discord => "discord",
        }
    }

    /// Request-session key of the pending identity for this backend.
    pub fn session_key(&self) -> String {
        format!("oauth_{}", self.as_str())
    }

    /// Request-session key of the CSRF state for this backend.
    pub fn state_key(&self) -> String {
        format!("oauth_state_{}", self.as_str())
    }
}

impl std::fmt::Display for OAuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(OAuthBackend::Google),
            "discord" => Ok(OAuthBackend::Discord),
            _ => Err(format!("Invalid OAuth backend: {}", s)),
        }
    }
}

/// Link between an external account and a local user.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthConnection {
    pub oauth_id: String,
    pub backend: String,
    pub email: String,
    pub detail: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for an OAuth connection.
#[derive(Debug, Clone)]
pub struct NewOAuthConnection {
    pub oauth_id: String,
    pub backend: OAuthBackend,
    pub email: String,
    pub detail: String,
    pub user_id: i64,
}

/// Identity reported by a provider.
///
/// `is_email_taken` is only filled in once the callback has checked whether a
/// local account already owns the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthUser {
    pub id: String,
    pub email: String,
    pub detail: String,
    #[serde(default)]
    pub is_email_taken: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse_and_keys() {
        let backend: OAuthBackend = "Discord".parse().unwrap();
        assert_eq!(backend, OAuthBackend::Discord);
        assert_eq!(backend.session_key(), "oauth_discord");
        assert_eq!(backend.state_key(), "oauth_state_discord");
        assert!("github".parse::<OAuthBackend>().is_err());
    }

    #[test]
    fn test_pending_identity_without_flag_deserializes() {
        let user: OAuthUser =
            serde_json::from_str(r#"{"id":"42","email":"a@b.io","detail":"Ann"}"#).unwrap();
        assert_eq!(user.is_email_taken, None);
    }
}
