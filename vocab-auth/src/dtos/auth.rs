use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::UserResponse;
use crate::utils::validation::validate_username;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UserInCreate {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "reader@example.com")]
    pub email: String,

    #[validate(custom(function = "validate_username"))]
    #[schema(example = "reader_one", min_length = 8, max_length = 20)]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "correct horse battery")]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UserInLogin {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "reader@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "correct horse battery")]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CredentialsInResponse {
    pub access_token: String,
    #[schema(example = 900)]
    pub expires_in: i64,
    #[schema(example = "Bearer")]
    pub token_type: String,
    pub refresh_token: String,
}

impl CredentialsInResponse {
    pub fn bearer(access_token: String, expires_in: i64, refresh_token: String) -> Self {
        Self {
            access_token,
            expires_in,
            token_type: "Bearer".to_string(),
            refresh_token,
        }
    }
}

/// Credentials plus the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthResult {
    pub credentials: CredentialsInResponse,
    pub user: UserResponse,
}
