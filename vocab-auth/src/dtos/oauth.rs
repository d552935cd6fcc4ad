use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::utils::validation::validate_username;

/// Registration payload when the email comes from the pending OAuth identity.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UserInOAuthCreate {
    #[validate(custom(function = "validate_username"))]
    #[schema(example = "reader_one")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Query parameters the provider appends to the callback URL.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
