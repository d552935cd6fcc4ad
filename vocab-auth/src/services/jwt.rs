use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;

use super::error::AuthError;

/// JWT service for access token generation and validation (HS256).
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expire_in_seconds: i64,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessClaims {
    /// Subject (user ID as string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// JWT ID (for blacklisting)
    pub jti: String,
    pub id: i64,
    pub email: String,
    pub username: String,
    pub is_superuser: bool,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.as_bytes();
        tracing::info!("JWT service initialized with HS256 secret");

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_token_expire_in_seconds: config.access_token_expire_in_seconds,
        }
    }

    /// Generate an access token for a user
    pub fn generate(&self, user: &User) -> Result<String, AuthError> {
        self.generate_with_lifetime(user, Duration::seconds(self.access_token_expire_in_seconds))
    }

    /// Generate an access token that expires `lifetime` from now.
    pub fn generate_with_lifetime(
        &self,
        user: &User,
        lifetime: Duration,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: user.id.to_string(),
            exp: (Utc::now() + lifetime).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            is_superuser: user.is_superuser,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AuthError::Internal(anyhow::anyhow!("Failed to encode access token: {}", e))
        })
    }

    /// Validate and decode an access token.
    ///
    /// Expiry is checked without leeway.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::TokenBadSignature,
                _ => AuthError::TokenMalformed,
            })
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expire_in_seconds
    }
}
