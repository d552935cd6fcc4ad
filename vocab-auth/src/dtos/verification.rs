use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::VerificationAction;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerificationInCreate {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "reader@example.com")]
    pub email: String,
    pub action: VerificationAction,
}

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RegisterQuery {
    /// Verification code mailed to the registering address.
    #[validate(range(min = 1, max = 999999))]
    #[param(example = 123456)]
    pub code: u32,
}
