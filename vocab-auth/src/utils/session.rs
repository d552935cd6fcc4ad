//! Per-browser scratch storage for the OAuth flow.
//!
//! The contents live in a signed `session` cookie as a JSON object, so they
//! survive the provider round trip without server-side state.

use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

pub const SESSION_COOKIE: &str = "session";

/// Key/value access to the caller's browser session.
pub trait RequestSession: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn insert(&mut self, key: &str, value: Value);
    fn remove(&mut self, key: &str) -> Option<Value>;
}

impl<'a> dyn RequestSession + 'a {
    /// Typed read; values that no longer deserialize are treated as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn insert_as<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), anyhow::Error> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value);
        Ok(())
    }
}

/// Session backed by the signed cookie jar.
#[derive(Debug, Default, Clone)]
pub struct CookieSession {
    data: Map<String, Value>,
    dirty: bool,
}

impl CookieSession {
    /// Reads the session cookie; a missing or unreadable cookie yields an empty session.
    pub fn load(jar: &SignedCookieJar) -> Self {
        let data = jar
            .get(SESSION_COOKIE)
            .and_then(|c| serde_json::from_str::<Map<String, Value>>(c.value()).ok())
            .unwrap_or_default();
        Self { data, dirty: false }
    }

    /// Writes the session back into the jar if anything changed.
    pub fn save(self, jar: SignedCookieJar) -> SignedCookieJar {
        if !self.dirty {
            return jar;
        }
        if self.data.is_empty() {
            return jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
        }

        let payload = Value::Object(self.data).to_string();
        jar.add(
            Cookie::build((SESSION_COOKIE, payload))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax),
        )
    }
}

impl RequestSession for CookieSession {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
        self.dirty = true;
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        self.dirty |= removed.is_some();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cookies::session_key;

    #[test]
    fn test_session_round_trips_through_signed_jar() {
        let key = session_key("unit-test-session-secret-0123456789abcdef");
        let mut session = CookieSession::default();
        session.insert("oauth_google", serde_json::json!({"id": "1"}));
        let jar = session.save(SignedCookieJar::new(key));

        let loaded = CookieSession::load(&jar);
        assert_eq!(loaded.get("oauth_google"), Some(serde_json::json!({"id": "1"})));
    }

    #[test]
    fn test_typed_helpers() {
        let mut session = CookieSession::default();
        let dynamic: &mut dyn RequestSession = &mut session;
        dynamic.insert_as("n", &5u32).unwrap();
        assert_eq!(dynamic.get_as::<u32>("n"), Some(5));
        assert_eq!(dynamic.get_as::<String>("n"), None);
    }

    #[test]
    fn test_untouched_session_is_not_rewritten() {
        let key = session_key("unit-test-session-secret-0123456789abcdef");
        let jar = CookieSession::default().save(SignedCookieJar::new(key));
        assert!(jar.get(SESSION_COOKIE).is_none());
    }
}
