pub mod auth;
pub mod oauth;
pub mod verification;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use auth::{AuthResult, CredentialsInResponse, UserInCreate, UserInLogin};
pub use oauth::{CallbackParams, UserInOAuthCreate};
pub use verification::{RegisterQuery, VerificationInCreate};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Login failed. Credentials are invalid.")]
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "vocab-auth")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
}
