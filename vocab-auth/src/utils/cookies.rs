use axum_extra::extract::cookie::{Cookie, CookieJar, Key, SameSite};
use sha2::{Digest, Sha512};

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const REFRESH_TOKEN_PATH: &str = "/api/auth";

/// Signing key of the browser session cookie, stretched from the configured secret.
pub fn session_key(secret: &str) -> Key {
    Key::from(&Sha512::digest(secret.as_bytes()))
}

/// Adds the HttpOnly refresh-token cookie, scoped to the auth routes.
pub fn set_refresh_cookie(jar: CookieJar, refresh_token: &str, max_age_seconds: i64) -> CookieJar {
    jar.add(
        Cookie::build((REFRESH_TOKEN_COOKIE, refresh_token.to_string()))
            .path(REFRESH_TOKEN_PATH)
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age_seconds)),
    )
}

pub fn clear_refresh_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(REFRESH_TOKEN_COOKIE).path(REFRESH_TOKEN_PATH))
}

pub fn refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_cookie_attributes() {
        let jar = set_refresh_cookie(CookieJar::new(), "abc", 3600);
        let cookie = jar.get(REFRESH_TOKEN_COOKIE).unwrap();
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some(REFRESH_TOKEN_PATH));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
        assert_eq!(refresh_token(&jar).as_deref(), Some("abc"));
    }

    #[test]
    fn test_clear_refresh_cookie() {
        let jar = set_refresh_cookie(CookieJar::new(), "abc", 3600);
        let jar = clear_refresh_cookie(jar);
        assert!(refresh_token(&jar).is_none());
    }
}
